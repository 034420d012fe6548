//! Zone behavior: heavy pointer swaps, signal clearing, annotations

use crate::common::*;

#[test]
fn heavy_write_survives_discard() {
    let warden = warden();
    let handle = Value::Handle(warden::warden_core::PayloadHandle(42));

    let err = warden
        .execute("writer", Value::Null, |ctx| -> Result<()> {
            let domain = ctx.view_at("domain")?;
            domain.set("heavy_frame", handle.clone())?;
            domain.set("x", 7)?;
            Err(Error::unit_failed("decoder crashed"))
        })
        .unwrap_err();

    assert!(matches!(err, Error::UnitFailed { .. }));
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(0)));
    assert_eq!(warden.version(), Version::ZERO);
    assert_eq!(warden.inspect("domain.heavy_frame").unwrap(), Some(handle));
}

#[test]
fn heavy_zone_is_pointer_swap_only() {
    let warden = warden();
    warden.engine().write_heavy("domain.heavy_blob", json!([1, 2])).unwrap();

    let err = warden
        .execute("writer", Value::Null, |ctx| ctx.view_at("domain.heavy_blob")?.append(3))
        .unwrap_err();
    assert!(err.is_capability_denied());

    let err = warden
        .execute("writer", Value::Null, |ctx| ctx.view_at("domain")?.delete("heavy_blob"))
        .unwrap_err();
    assert!(err.is_capability_denied());

    warden
        .execute("writer", Value::Null, |ctx| ctx.view_at("domain")?.set("heavy_blob", "swapped"))
        .unwrap();
    assert_eq!(
        warden.engine().read_heavy("domain.heavy_blob").unwrap(),
        Some(Value::from("swapped"))
    );
}

#[test]
fn signals_are_cleared_each_cycle() {
    let warden = builder().zone("events", Zone::Signal).build().unwrap();

    warden
        .execute("writer", Value::Null, |ctx| {
            let domain = ctx.view_at("domain")?;
            domain.set("sig_tick", 1)?;
            domain.set("events", json!([]))?;
            domain.at("events")?.append("started")
        })
        .unwrap();
    assert_eq!(warden.version(), Version::new(1));

    assert_eq!(warden.clear_signals().unwrap(), Some(Version::new(2)));
    assert_eq!(warden.inspect("domain.sig_tick").unwrap(), None);
    assert_eq!(warden.inspect("domain.events").unwrap(), None);
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(0)));
    assert_eq!(warden.clear_signals().unwrap(), None);
}

#[test]
fn zone_ceilings_hold_through_containers() {
    let warden = warden();
    warden
        .execute("writer", Value::Null, |ctx| {
            let domain = ctx.view_at("domain")?;
            domain.set("log", json!({"sig_feed": [1]}))?;
            domain.set("meta_note", "diag")
        })
        .unwrap();

    // Dropping the signal child along with its parent needs Delete on it
    for attempt in 0..2 {
        let err = warden
            .execute("writer", Value::Null, |ctx| {
                let domain = ctx.view_at("domain")?;
                match attempt {
                    0 => domain.set("log", json!({})),
                    _ => domain.delete("log").map(|_| ()),
                }
            })
            .unwrap_err();
        assert!(err.is_capability_denied(), "{err}");
    }
    assert_eq!(warden.inspect("domain.log.sig_feed").unwrap(), Some(Value::from(json!([1]))));

    let seen = warden
        .execute("reader", Value::Null, |ctx| ctx.view_at("domain")?.read())
        .unwrap()
        .value
        .unwrap();
    assert_eq!(seen.get_path(&["meta_note".to_string()]), None);
    assert_eq!(seen.get_path(&["x".to_string()]), Some(&Value::Int(0)));
    assert_eq!(warden.inspect("domain.meta_note").unwrap(), Some(Value::from("diag")));

    warden.engine().write_heavy("domain.heavy_blob", json!({"ptr": 1})).unwrap();
    let err = warden
        .execute("writer", Value::Null, |ctx| ctx.view_at("domain.heavy_blob")?.set("ptr", 2))
        .unwrap_err();
    assert!(err.is_capability_denied());
    let ptr = warden
        .execute("reader", Value::Null, |ctx| ctx.view_at("domain.heavy_blob")?.value("ptr"))
        .unwrap()
        .value;
    assert_eq!(ptr, Some(Value::Int(1)));
    assert_eq!(warden.inspect("domain.heavy_blob.ptr").unwrap(), Some(Value::Int(1)));
}

#[test]
fn conflicting_annotation_rejected() {
    let err = builder().zone("sig_tick", Zone::Data).build().unwrap_err();
    assert!(matches!(err, Error::ZoneReassigned { .. }));
}
