//! Optimistic concurrency: smart and strict validation, retries, priority

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn disjoint_writers_both_commit() {
    let warden = warden();
    advance(&warden, 5);
    assert_eq!(warden.version(), Version::new(5));

    let engine = warden.engine();
    let a = engine.begin("writer").unwrap();
    let b = engine.begin("rival").unwrap();
    assert_eq!(a.base_version(), Version::new(5));
    assert_eq!(b.base_version(), Version::new(5));

    a.view_at("domain").unwrap().set("x", 1).unwrap();
    b.view_at("domain").unwrap().set("y", 2).unwrap();

    assert_eq!(engine.attempt_commit(a, None).unwrap(), Version::new(6));
    assert_eq!(engine.attempt_commit(b, None).unwrap(), Version::new(7));
    assert_eq!(warden.version(), Version::new(7));
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(1)));
    assert_eq!(warden.inspect("domain.y").unwrap(), Some(Value::Int(2)));
}

#[test]
fn conflicting_writers_one_retries() {
    let warden = warden();
    advance(&warden, 5);
    let engine = warden.engine();

    let a = engine.begin("writer").unwrap();
    let b = engine.begin("rival").unwrap();
    a.view_at("domain").unwrap().set("x", 1).unwrap();
    b.view_at("domain").unwrap().set("x", 2).unwrap();

    assert_eq!(engine.attempt_commit(a, None).unwrap(), Version::new(6));
    let err = engine.attempt_commit(b, None).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, Error::WriteConflict { version, .. } if version == Version::new(6)));
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(1)));

    let retry = engine.begin("rival").unwrap();
    assert_eq!(retry.base_version(), Version::new(6));
    retry.view_at("domain").unwrap().set("x", 2).unwrap();
    assert_eq!(engine.attempt_commit(retry, None).unwrap(), Version::new(7));
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(2)));
}

#[test]
fn strict_mode_rejects_any_intervening_commit() {
    let warden = builder().strict().build().unwrap();
    let engine = warden.engine();

    let a = engine.begin("writer").unwrap();
    let b = engine.begin("rival").unwrap();
    a.view_at("domain").unwrap().set("x", 1).unwrap();
    b.view_at("domain").unwrap().set("y", 2).unwrap();

    engine.attempt_commit(a, None).unwrap();
    let err = engine.attempt_commit(b, None).unwrap_err();
    assert!(matches!(
        err,
        Error::VersionMismatch { expected, actual } if expected == Version::ZERO && actual == Version::new(1)
    ));
    assert_eq!(warden.inspect("domain.y").unwrap(), Some(Value::Int(0)));
}

#[test]
fn trimmed_history_is_retryable() {
    let warden = builder().history_limit(2).build().unwrap();
    let engine = warden.engine();

    let stale = engine.begin("writer").unwrap();
    stale.view_at("domain").unwrap().set("x", 1).unwrap();
    advance(&warden, 3);

    let err = engine.attempt_commit(stale, None).unwrap_err();
    assert!(matches!(err, Error::HistoryTrimmed { .. }));
    assert!(err.is_retryable());
}

#[test]
fn execute_retries_until_commit() {
    let warden = warden();
    let out = warden
        .execute("writer", Value::Null, |ctx| {
            if ctx.attempt() < 3 {
                commit_rival(&warden, "counter", 10 * ctx.attempt() as i64);
            }
            let domain = ctx.view_at("domain")?;
            let counter = domain.value("counter")?.and_then(|v| v.as_int()).unwrap_or(0);
            domain.set("counter", counter + 1)
        })
        .unwrap();

    assert_eq!(out.attempts, 3);
    assert_eq!(out.version, Version::new(3));
    assert_eq!(warden.inspect("domain.counter").unwrap(), Some(Value::Int(21)));
    assert_eq!(warden.metrics().conflicts, 2);
}

#[test]
fn retry_budget_surfaces_livelock() {
    let warden = builder().retry(fast_retry(3)).build().unwrap();
    let mut runs = 0;
    let err = warden
        .execute("writer", Value::Null, |ctx| {
            runs += 1;
            commit_rival(&warden, "x", runs);
            ctx.view_at("domain")?.set("x", -1)
        })
        .unwrap_err();

    assert_eq!(runs, 3);
    match err {
        Error::RetryBudgetExceeded { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, Error::WriteConflict { .. }));
        }
        other => panic!("expected RetryBudgetExceeded, got {other:?}"),
    }
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(3)));
    assert_eq!(warden.metrics().exhausted, 1);
}

#[test]
fn starved_caller_receives_priority_ticket() {
    let warden = builder().retry(fast_retry(8)).build().unwrap();
    let arbiter = || warden.engine().conflict_resolver().arbiter();
    let options = ExecuteOptions::new().priority_token("slow");

    let out = warden
        .execute_with("writer", Value::Null, &options, |ctx| {
            match ctx.attempt() {
                1..=3 => {
                    commit_rival(&warden, "x", ctx.attempt() as i64);
                }
                _ => {
                    assert_eq!(arbiter().ticket_holder().as_deref(), Some("slow"));
                    assert_eq!(arbiter().conflicts("slow"), 3);
                }
            }
            ctx.view_at("domain")?.set("x", 100)
        })
        .unwrap();

    assert_eq!(out.attempts, 4);
    assert_eq!(arbiter().ticket_holder(), None);
    assert_eq!(arbiter().conflicts("slow"), 0);
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(100)));
}

#[test]
fn versions_increase_by_one_under_contention() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    let warden = builder().retry(fast_retry(10_000)).build().unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let warden = warden.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let token = format!("worker-{t}");
                let options = ExecuteOptions::new().priority_token(token);
                (0..PER_THREAD)
                    .map(|_| {
                        warden
                            .execute_with("writer", Value::Null, &options, |ctx| {
                                let domain = ctx.view_at("domain")?;
                                let n = domain.value("counter")?.and_then(|v| v.as_int()).unwrap_or(0);
                                domain.set("counter", n + 1)
                            })
                            .unwrap()
                            .version
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut versions: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .map(|v| v.as_u64())
        .collect();
    versions.sort_unstable();

    let total = (THREADS * PER_THREAD) as u64;
    assert_eq!(versions, (1..=total).collect::<Vec<_>>());
    assert_eq!(warden.inspect("domain.counter").unwrap(), Some(Value::Int(total as i64)));
}

#[test]
fn view_is_inert_after_transaction_closes() {
    let warden = warden();
    let out = warden
        .execute("writer", Value::Null, |ctx| ctx.view_at("domain"))
        .unwrap();

    let leaked = out.value;
    match leaked.set("x", 1) {
        Err(Error::StaleView { path, .. }) => assert_eq!(path.to_string(), "domain.x"),
        other => panic!("expected StaleView, got {other:?}"),
    }
    assert!(matches!(leaked.read(), Err(Error::StaleView { .. })));
    assert_eq!(warden.inspect("domain.x").unwrap(), Some(Value::Int(0)));
}
