//! Capability enforcement through guarded views

use crate::common::*;

fn grid_warden() -> Warden {
    init_tracing();
    Warden::builder()
        .root(json!({"domain": {"plain": 1, "sig_x": 1, "meta_x": 1}}))
        .retry(fast_retry(1))
        .unit("r", reads("domain"))
        .unit("w", writes("domain"))
        .build()
        .unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Update,
    Insert,
    Delete,
}

impl Access {
    fn needed(self) -> Capability {
        match self {
            Access::Read => Capability::READ,
            Access::Update => Capability::UPDATE,
            Access::Insert => Capability::APPEND,
            Access::Delete => Capability::DELETE,
        }
    }
}

#[test]
fn operations_succeed_exactly_within_resolved_set() {
    let warden = grid_warden();
    let resolver = warden.engine().resolver();
    let names = [("plain", "plain_new"), ("sig_x", "sig_new"), ("meta_x", "meta_new")];
    let accesses = [Access::Read, Access::Update, Access::Insert, Access::Delete];

    for unit in ["r", "w"] {
        let manifest = warden.engine().registry().get(unit).unwrap();
        for (existing, fresh) in names {
            for access in accesses {
                let name = match access {
                    Access::Insert => fresh,
                    _ => existing,
                };
                let path: Path = format!("domain.{name}").parse().unwrap();
                let allowed = resolver
                    .resolve(&path, &manifest, false)
                    .unwrap()
                    .contains(access.needed());

                let result = warden.execute(unit, Value::Null, |ctx| {
                    let domain = ctx.view_at("domain")?;
                    match access {
                        Access::Read => domain.value(name).map(|_| ()),
                        Access::Update | Access::Insert => domain.set(name, 2),
                        Access::Delete => domain.delete(name).map(|_| ()),
                    }
                });

                match result {
                    Ok(_) => assert!(allowed, "{unit} {access:?} {path} should be denied"),
                    Err(e) => {
                        assert!(!allowed, "{unit} {access:?} {path} should succeed: {e}");
                        assert!(e.is_capability_denied(), "unexpected error {e}");
                    }
                }
            }
        }
    }
}

#[test]
fn signal_zone_is_append_only() {
    let warden = grid_warden();
    let err = warden
        .execute("w", Value::Null, |ctx| ctx.view_at("domain")?.set("sig_x", 5))
        .unwrap_err();
    match err {
        Error::CapabilityDenied { missing, grant_hint, .. } => {
            assert_eq!(missing, Capability::UPDATE);
            assert!(grant_hint.contains("zone signal"), "{grant_hint}");
        }
        other => panic!("expected CapabilityDenied, got {other:?}"),
    }
}

#[test]
fn meta_zone_is_write_only_to_units() {
    let warden = grid_warden();
    warden
        .execute("w", Value::Null, |ctx| ctx.view_at("domain")?.set("meta_x", 7))
        .unwrap();
    let err = warden
        .execute("w", Value::Null, |ctx| ctx.view_at("domain")?.value("meta_x"))
        .unwrap_err();
    assert!(err.is_capability_denied());
    assert_eq!(warden.inspect("domain.meta_x").unwrap(), Some(Value::Int(7)));
}

#[test]
fn undeclared_path_denied_by_default() {
    let warden = builder()
        .unit("narrow", reads("domain.x"))
        .build()
        .unwrap();

    let err = warden
        .execute("narrow", Value::Null, |ctx| ctx.view_at("domain.y")?.read())
        .unwrap_err();
    match err {
        Error::CapabilityDenied { path, grant_hint, .. } => {
            assert_eq!(path.to_string(), "domain.y");
            assert!(grant_hint.contains("domain.y"), "{grant_hint}");
        }
        other => panic!("expected CapabilityDenied, got {other:?}"),
    }

    let out = warden
        .execute("narrow", Value::Null, |ctx| ctx.view_at("domain.x")?.read())
        .unwrap();
    assert_eq!(out.value, Some(Value::Int(0)));
}

#[test]
fn read_only_default_is_opt_in() {
    let warden = builder()
        .read_only_default()
        .unit("auditor", Manifest::empty())
        .build()
        .unwrap();

    let out = warden
        .execute("auditor", Value::Null, |ctx| ctx.view_at("domain")?.value("counter"))
        .unwrap();
    assert_eq!(out.value, Some(Value::Int(0)));

    let err = warden
        .execute("auditor", Value::Null, |ctx| ctx.view_at("domain")?.set("counter", 1))
        .unwrap_err();
    assert!(err.is_capability_denied());
}

#[test]
fn global_layer_is_read_only() {
    let warden = builder()
        .unit("greedy", writes("global"))
        .build()
        .unwrap();

    let rate = warden
        .execute("greedy", Value::Null, |ctx| ctx.view_at("global")?.value("rate"))
        .unwrap();
    assert_eq!(rate.value, Some(Value::Int(2)));

    let err = warden
        .execute("greedy", Value::Null, |ctx| ctx.view_at("global")?.set("rate", 3))
        .unwrap_err();
    match err {
        Error::CapabilityDenied { grant_hint, .. } => {
            assert!(grant_hint.contains("read-only"), "{grant_hint}")
        }
        other => panic!("expected CapabilityDenied, got {other:?}"),
    }
}

#[test]
fn admin_propagates_to_every_depth() {
    let warden = builder()
        .unit("root", Manifest::builder().admin(true).build().unwrap())
        .build()
        .unwrap();

    warden
        .execute("root", Value::Null, |ctx| {
            let mut view = ctx.view()?;
            assert_eq!(view.capabilities(), Capability::FULL);
            view = view.child("domain")?;
            for depth in 0..=10 {
                assert_eq!(view.capabilities(), Capability::FULL, "depth {depth}");
                let name = match depth % 3 {
                    0 => format!("sig_{depth}"),
                    1 => format!("meta_{depth}"),
                    _ => format!("level{depth}"),
                };
                view = view.child(&name)?;
            }
            view.set("leaf", 1)?;
            ctx.view_at("global")?.set("rate", 5)
        })
        .unwrap();

    assert_eq!(warden.inspect("global.rate").unwrap(), Some(Value::Int(5)));
}

#[test]
fn local_layer_never_reaches_the_store() {
    let warden = builder()
        .unit("scratch", Manifest::builder().admin(true).build().unwrap())
        .build()
        .unwrap();

    warden
        .execute("scratch", Value::Null, |ctx| {
            assert!(matches!(ctx.view_at("local.tmp"), Err(Error::InvalidPath { .. })));
            ctx.local_mut().set("local.tmp.step", 1)?;
            assert_eq!(ctx.local().get("local.tmp.step")?, Some(&Value::Int(1)));
            Ok(())
        })
        .unwrap();

    assert_eq!(warden.inspect("local.tmp").unwrap(), None);
    assert_eq!(warden.version(), Version::ZERO);
}
