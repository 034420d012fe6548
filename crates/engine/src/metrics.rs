//! Engine counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) committed: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) audit_failures: AtomicU64,
    pub(crate) capability_denials: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time engine metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineMetrics {
    /// Executions that committed (including ones with nothing to write)
    pub committed: u64,
    /// Attempts whose transaction was discarded
    pub discarded: u64,
    /// Commits rejected as conflicts
    pub conflicts: u64,
    /// Attempts re-run after a retryable failure
    pub retries: u64,
    /// Executions that exhausted their retry budget
    pub exhausted: u64,
    /// Executions failed by the policy validator
    pub audit_failures: u64,
    /// Executions failed on a capability check
    pub capability_denials: u64,
    /// Current store version
    pub version: u64,
}

impl EngineMetrics {
    /// Fraction of attempts that committed (1.0 when idle).
    pub fn commit_rate(&self) -> f64 {
        let total = self.committed + self.discarded;
        if total == 0 {
            return 1.0;
        }
        self.committed as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_rate() {
        assert_eq!(EngineMetrics::default().commit_rate(), 1.0);
        let metrics = EngineMetrics {
            committed: 3,
            discarded: 1,
            ..Default::default()
        };
        assert!((metrics.commit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
