//! Shared helpers for the integration suites.

#![allow(dead_code)]

pub use warden::prelude::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Route engine logs through the test writer (`RUST_LOG` aware).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });
}

/// Retries without sleeping.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        max_elapsed_ms: 60_000,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter: false,
    }
}

/// Manifest writing everything under `path`.
pub fn writes(path: &str) -> Manifest {
    Manifest::builder().write(path).build().unwrap()
}

/// Manifest reading everything under `path`.
pub fn reads(path: &str) -> Manifest {
    Manifest::builder().read(path).build().unwrap()
}

/// Initial tree used by most scenarios.
pub fn seed() -> Value {
    Value::from(json!({
        "global": {"rate": 2},
        "domain": {
            "x": 0,
            "y": 0,
            "counter": 0,
            "order": {"lines": [], "total": 0},
        },
    }))
}

/// Builder preloaded with the seed tree and the common units.
pub fn builder() -> WardenBuilder {
    init_tracing();
    Warden::builder()
        .root(seed())
        .retry(fast_retry(16))
        .unit("writer", writes("domain"))
        .unit("rival", writes("domain"))
        .unit("reader", reads("domain"))
        .unit("filler", writes("domain.filler"))
}

/// Default test engine.
pub fn warden() -> Warden {
    builder().build().unwrap()
}

/// Commit `n` unrelated writes so the store reaches version `n`.
pub fn advance(warden: &Warden, n: u64) {
    for i in 0..n {
        warden
            .execute("filler", Value::Null, |ctx| {
                ctx.view_at("domain")?.set("filler", i as i64)
            })
            .unwrap();
    }
}

/// Set `domain.<key>` through the engine, outside any other transaction.
pub fn commit_rival(warden: &Warden, key: &str, value: i64) -> Version {
    let txn = warden.engine().begin("rival").unwrap();
    txn.view_at("domain").unwrap().set(key, value).unwrap();
    warden.engine().attempt_commit(txn, None).unwrap()
}
