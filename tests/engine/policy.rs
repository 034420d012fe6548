//! Policy validation around unit execution

use crate::common::*;

fn pay(warden: &Warden, amount: i64) -> Result<Committed<()>> {
    warden.execute("pay", json!({ "amount": amount }), |ctx| {
        let domain = ctx.view_at("domain")?;
        let runs = domain.value("counter")?.and_then(|v| v.as_int()).unwrap_or(0);
        domain.set("counter", runs + 1)
    })
}

fn runs(warden: &Warden) -> i64 {
    warden
        .inspect("domain.counter")
        .unwrap()
        .and_then(|v| v.as_int())
        .unwrap_or(0)
}

fn blocking(reset_on_success: bool) -> Warden {
    builder()
        .unit("pay", writes("domain"))
        .rule("pay", Rule::new("amount", Severity::Block).min(0.0).threshold(3))
        .reset_on_success(reset_on_success)
        .build()
        .unwrap()
}

#[test]
fn block_raises_at_threshold_then_resets() {
    let warden = blocking(false);

    pay(&warden, -1).unwrap();
    pay(&warden, -1).unwrap();
    assert_eq!(runs(&warden), 2);

    match pay(&warden, -1) {
        Err(Error::AuditBlock { count, .. }) => assert_eq!(count, 3),
        other => panic!("expected AuditBlock, got {other:?}"),
    }
    assert_eq!(runs(&warden), 2);
    assert_eq!(warden.engine().validator().violation_count("pay", RulePhase::Input, "amount"), 0);

    pay(&warden, -1).unwrap();
    assert_eq!(runs(&warden), 3);
    assert_eq!(warden.metrics().audit_failures, 1);
}

#[test]
fn intermittent_violations_accumulate_without_reset() {
    let warden = blocking(false);
    pay(&warden, -1).unwrap();
    pay(&warden, 5).unwrap();
    pay(&warden, -1).unwrap();
    assert!(matches!(pay(&warden, -1), Err(Error::AuditBlock { .. })));
}

#[test]
fn reset_on_success_counts_only_consecutive_violations() {
    let warden = blocking(true);
    pay(&warden, -1).unwrap();
    pay(&warden, 5).unwrap();
    pay(&warden, -1).unwrap();
    pay(&warden, -1).unwrap();
    assert_eq!(warden.engine().validator().violation_count("pay", RulePhase::Input, "amount"), 2);
    assert!(matches!(pay(&warden, -1), Err(Error::AuditBlock { .. })));
}

#[test]
fn stop_prevents_execution() {
    let warden = builder()
        .unit("pay", writes("domain"))
        .rule("pay", Rule::new("amount", Severity::Stop).max(100.0))
        .build()
        .unwrap();

    assert!(matches!(pay(&warden, 500), Err(Error::AuditStop { .. })));
    assert_eq!(runs(&warden), 0);
    pay(&warden, 50).unwrap();
    assert_eq!(runs(&warden), 1);
}

#[test]
fn unit_without_rules_skips_validation() {
    let warden = builder()
        .unit("pay", writes("domain"))
        .rule("refund", Rule::new("amount", Severity::Stop).min(0.0))
        .build()
        .unwrap();

    for _ in 0..5 {
        pay(&warden, -1_000).unwrap();
    }
    assert_eq!(runs(&warden), 5);
    assert_eq!(warden.engine().validator().violation_count("pay", RulePhase::Input, "amount"), 0);
}

#[test]
fn output_rules_guard_pending_state() {
    let warden = builder()
        .unit("price", writes("domain"))
        .rule(
            "price",
            Rule::new("domain.order.total", Severity::Abort).output().min(0.0),
        )
        .build()
        .unwrap();

    let err = warden
        .execute("price", Value::Null, |ctx| ctx.view_at("domain.order")?.set("total", -5))
        .unwrap_err();
    assert!(matches!(err, Error::AuditAbort { .. }));
    assert_eq!(warden.inspect("domain.order.total").unwrap(), Some(Value::Int(0)));

    warden
        .execute("price", Value::Null, |ctx| ctx.view_at("domain")?.set("x", -5))
        .unwrap();
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(-5)));
}

#[test]
fn count_severity_only_records() {
    let warden = builder()
        .unit("pay", writes("domain"))
        .rule("pay", Rule::new("amount", Severity::Count).min(0.0))
        .build()
        .unwrap();

    for _ in 0..4 {
        pay(&warden, -1).unwrap();
    }
    assert_eq!(runs(&warden), 4);
    assert_eq!(warden.engine().validator().violation_count("pay", RulePhase::Input, "amount"), 4);
}

#[test]
fn rules_load_from_config() {
    init_tracing();
    let warden = Warden::from_toml_str(
        r#"
        [retry]
        max_attempts = 2

        [[rules.units.tag]]
        target = "label"
        severity = "stop"
        checks = { pattern = "^[a-z]+$", max_len = 8 }
        "#,
    )
    .unwrap();
    warden.register("tag", writes("domain"));

    let tag = |label: &str| {
        warden.execute("tag", json!({ "label": label }), |ctx| {
            ctx.view_at("domain")?.set("label", ctx.arg("label").cloned().unwrap_or_default())
        })
    };

    tag("fresh").unwrap();
    assert!(matches!(tag("Shouting"), Err(Error::AuditStop { .. })));
    assert!(matches!(tag("muchtoolong"), Err(Error::AuditStop { .. })));
    assert_eq!(warden.inspect("domain.label").unwrap(), Some(Value::from("fresh")));
}
