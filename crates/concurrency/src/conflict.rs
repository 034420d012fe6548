//! Conflict resolution
//!
//! Commit validation runs inside the store's commit lock:
//!
//! | Mode | Rejects when |
//! |------|--------------|
//! | Strict | any commit happened after the base version |
//! | Smart | a commit after the base version touched a path overlapping the write set |
//!
//! Rejections are retryable. [`ConflictResolver::run`] re-runs a unit of
//! work against fresh snapshots under a [`RetryPolicy`], consulting the
//! [`PriorityArbiter`] so one starved caller cannot be out-raced forever.

use crate::priority::{PriorityArbiter, PriorityConfig};
use crate::retry::RetryPolicy;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};
use warden_core::{Error, Path, Result, Version};
use warden_storage::CommitCheck;

/// Commit validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Reject unless no commit of any kind happened since the base version
    Strict,
    /// Reject only commits whose write set was concurrently modified
    #[default]
    Smart,
}

/// Validate a commit against the log. Runs under the commit lock.
pub fn validate(
    mode: CommitMode,
    base: Version,
    write_set: &BTreeSet<Path>,
    check: &CommitCheck<'_>,
) -> Result<()> {
    let current = check.current_version();
    if current == base {
        return Ok(());
    }
    match mode {
        CommitMode::Strict => Err(Error::VersionMismatch {
            expected: base,
            actual: current,
        }),
        CommitMode::Smart => {
            for (version, touched) in check.touched_since(base)? {
                if let Some(path) = write_set.iter().find(|w| w.overlaps(touched)) {
                    return Err(Error::WriteConflict {
                        path: path.clone(),
                        version,
                    });
                }
            }
            Ok(())
        }
    }
}

/// A successful run: the unit's output plus where it landed.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    /// Value returned by the unit of work
    pub value: T,
    /// Version produced (the base version if nothing was written)
    pub version: Version,
    /// Attempts taken, including the successful one
    pub attempts: u32,
}

/// Counters kept by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Commits rejected as conflicts
    pub conflicts: u64,
    /// Attempts re-run after a retryable failure
    pub retries: u64,
    /// Runs that exhausted their retry budget
    pub exhausted: u64,
}

/// Commits transactions and drives retries.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    mode: CommitMode,
    policy: RetryPolicy,
    arbiter: PriorityArbiter,
    conflicts: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
}

impl ConflictResolver {
    /// Create a resolver.
    pub fn new(mode: CommitMode, policy: RetryPolicy, priority: PriorityConfig) -> Self {
        ConflictResolver {
            mode,
            policy,
            arbiter: PriorityArbiter::new(priority),
            conflicts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Validation mode.
    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    /// Retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Priority arbiter.
    pub fn arbiter(&self) -> &PriorityArbiter {
        &self.arbiter
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            conflicts: self.conflicts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }

    /// Commit `txn` once, updating the arbiter for `token`.
    pub fn attempt_commit(&self, txn: Transaction, token: Option<&str>) -> Result<Version> {
        let result = txn.commit(self.mode);
        match &result {
            Ok(_) => {
                if let Some(token) = token {
                    self.arbiter.record_success(token);
                }
            }
            Err(e) if e.is_retryable() => self.note_conflict(token),
            Err(_) => {}
        }
        result
    }

    fn note_conflict(&self, token: Option<&str>) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        if let Some(token) = token {
            self.arbiter.record_conflict(token);
        }
    }

    fn give_up(&self, token: Option<&str>) {
        if let Some(token) = token {
            self.arbiter.forget(token);
        }
    }

    /// Run `body` and commit its transaction, retrying retryable failures.
    ///
    /// `body` receives the 1-based attempt number and must open a fresh
    /// transaction each time. Non-retryable errors return immediately;
    /// exhausting the policy returns `RetryBudgetExceeded`.
    pub fn run<T, F>(&self, token: Option<&str>, mut body: F) -> Result<Committed<T>>
    where
        F: FnMut(u32) -> Result<(T, Transaction)>,
    {
        let started = Instant::now();
        let mut rng = rand::thread_rng();
        let mut attempt: u32 = 1;
        loop {
            let outcome = match body(attempt) {
                Ok((value, txn)) => self
                    .attempt_commit(txn, token)
                    .map(|version| (value, version)),
                Err(e) => {
                    if e.is_retryable() {
                        self.note_conflict(token);
                    }
                    Err(e)
                }
            };

            let error = match outcome {
                Ok((value, version)) => {
                    return Ok(Committed {
                        value,
                        version,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => {
                    self.give_up(token);
                    return Err(e);
                }
            };

            let elapsed = started.elapsed();
            if self.policy.is_exhausted(attempt, elapsed) {
                self.give_up(token);
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    attempts = attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %error,
                    "Retry budget exceeded"
                );
                return Err(Error::RetryBudgetExceeded {
                    attempts: attempt,
                    elapsed_ms: elapsed.as_millis() as u64,
                    last: Box::new(error),
                });
            }

            let standing = self.arbiter.standing(token);
            let delay = self.arbiter.adjust_delay(
                standing,
                self.policy.delay_for(attempt, &mut rng),
                self.policy.base_delay(),
            );
            debug!(attempt, ?standing, delay_us = delay.as_micros() as u64, error = %error, "Retrying");
            self.retries.fetch_add(1, Ordering::Relaxed);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            attempt += 1;
        }
    }
}
