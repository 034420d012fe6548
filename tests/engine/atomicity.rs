//! Atomicity and no-silent-loss
//!
//! A failed unit leaves the store untouched; a committed one reflects
//! every mutation made through its views.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[test]
fn failed_unit_leaves_store_identical() {
    let warden = warden();
    advance(&warden, 2);
    let before = warden.snapshot();

    let err = warden
        .execute("writer", Value::Null, |ctx| -> Result<()> {
            let domain = ctx.view_at("domain")?;
            domain.set("x", 99)?;
            domain.at("order")?.child("lines")?.append(json!({"sku": "a"}))?;
            domain.at("order")?.set("total", 10)?;
            domain.set("fresh", json!({"deep": {"er": 1}}))?;
            domain.delete("y")?;
            Err(Error::unit_failed("payment declined"))
        })
        .unwrap_err();

    assert!(matches!(err, Error::UnitFailed { .. }));
    let after = warden.snapshot();
    assert_eq!(after.version(), before.version());
    assert_eq!(after.root(), before.root());
}

#[test]
fn capability_failure_discards_earlier_writes() {
    let warden = builder()
        .unit("partial", Manifest::builder().write("domain.x").read("domain.y").build().unwrap())
        .build()
        .unwrap();

    let err = warden
        .execute("partial", Value::Null, |ctx| {
            ctx.view_at("domain")?.set("x", 5)?;
            ctx.view_at("domain")?.set("y", 5)
        })
        .unwrap_err();

    assert!(err.is_capability_denied());
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(0)));
    assert_eq!(warden.version(), Version::ZERO);
}

#[test]
fn deep_new_keys_survive_commit() {
    let warden = warden();
    warden
        .execute("writer", Value::Null, |ctx| {
            let order = ctx.view_at("domain.order")?;
            order.modify("lines", |lines| {
                if let Value::Array(items) = lines {
                    std::sync::Arc::make_mut(items).push(Value::from(json!({"sku": "b", "qty": 2})));
                }
            })?;
            order.set("meta", json!({}))?;
            order.at("meta")?.set("source", "web")?;
            ctx.view_at("domain.new.branch")?.set("leaf", true)
        })
        .unwrap();

    assert_eq!(warden.inspect("domain.order.lines.0.qty").unwrap(), Some(Value::Int(2)));
    assert_eq!(
        warden.inspect("domain.order.meta.source").unwrap(),
        Some(Value::from("web"))
    );
    assert_eq!(warden.inspect("domain.new.branch.leaf").unwrap(), Some(Value::Bool(true)));
    assert_eq!(warden.version(), Version::new(1));
}

#[test]
fn explicit_and_shadow_writes_merge() {
    let warden = warden();
    warden
        .execute("writer", Value::Null, |ctx| {
            ctx.record("domain.y", DeltaOp::Set(Value::Int(1)))?;
            ctx.record("domain.x", DeltaOp::Set(Value::Int(1)))?;
            // The shadow's content wins over the stale explicit delta.
            ctx.view_at("domain")?.set("x", 2)
        })
        .unwrap();

    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(2)));
    assert_eq!(warden.inspect("domain.y").unwrap(), Some(Value::Int(1)));
}

#[derive(Debug, Clone)]
enum Op {
    Nested { key: u8, field: u8, value: i64, from_root: bool },
    Push { value: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..3, 0u8..3, any::<i64>(), any::<bool>()).prop_map(|(key, field, value, from_root)| {
            Op::Nested { key, field, value, from_root }
        }),
        any::<i64>().prop_map(|value| Op::Push { value }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_mutation_is_committed(ops in proptest::collection::vec(op(), 1..24)) {
        let warden = warden();
        let mut expected: BTreeMap<String, i64> = BTreeMap::new();
        let mut pushed = Vec::new();
        for op in &ops {
            match op {
                Op::Nested { key, field, value, .. } => {
                    expected.insert(format!("domain.k{key}.f{field}"), *value);
                }
                Op::Push { value } => pushed.push(*value),
            }
        }

        warden
            .execute("writer", Value::Null, |ctx| {
                for op in &ops {
                    match op {
                        Op::Nested { key, field, value, from_root: true } => {
                            ctx.view_at("domain")?
                                .at(&format!("k{key}"))?
                                .set(&format!("f{field}"), *value)?;
                        }
                        Op::Nested { key, field, value, from_root: false } => {
                            ctx.view_at(&format!("domain.k{key}"))?
                                .set(&format!("f{field}"), *value)?;
                        }
                        Op::Push { value } => {
                            ctx.view_at("domain.order.lines")?.append(*value)?;
                        }
                    }
                }
                Ok(())
            })
            .unwrap();

        for (path, value) in &expected {
            prop_assert_eq!(warden.inspect(path).unwrap(), Some(Value::Int(*value)));
        }
        let lines = warden.inspect("domain.order.lines").unwrap().unwrap();
        let lines: Vec<i64> = lines
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_int().unwrap())
            .collect();
        prop_assert_eq!(lines, pushed);
        prop_assert_eq!(warden.version(), Version::new(1));
    }
}
