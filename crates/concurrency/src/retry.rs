//! Retry policy
//!
//! Exponential backoff with equal jitter: attempt `n` waits between half
//! and all of `min(base * 2^(n-1), max)`. A retry budget bounds both the
//! number of attempts and the wall-clock time spent, so livelock surfaces
//! as `RetryBudgetExceeded` instead of spinning forever.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff and budget for commit retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wall-clock budget across all attempts, in milliseconds
    pub max_elapsed_ms: u64,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on a single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Randomize each delay between half and all of its nominal value
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            max_elapsed_ms: 5_000,
            base_delay_ms: 1,
            max_delay_ms: 100,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Retry up to `max_attempts` times without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
            ..Self::default()
        }
    }

    /// Wall-clock budget.
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    /// Base delay.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Nominal (unjittered) delay after failed attempt `attempt` (1-based).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let micros = self
            .base_delay_ms
            .saturating_mul(1_000)
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms.saturating_mul(1_000));
        Duration::from_micros(micros)
    }

    /// Delay after failed attempt `attempt`, jittered if enabled.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if !self.jitter {
            return nominal;
        }
        let micros = nominal.as_micros() as u64;
        let half = micros / 2;
        Duration::from_micros(half + rng.gen_range(0..=micros - half))
    }

    /// Has the budget run out after `attempts` attempts taking `elapsed`?
    pub fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        attempts >= self.max_attempts || elapsed >= self.max_elapsed()
    }
}
