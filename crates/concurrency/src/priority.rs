//! Priority arbitration
//!
//! Optimistic retries can starve a slow caller: every time it is ready to
//! commit, a faster one has already moved the version. The arbiter counts
//! consecutive conflicts per caller token. A token reaching the starvation
//! threshold is granted the single priority ticket; its holder retries with
//! the expedited delay while every other caller backs off an extra base
//! delay per attempt. The ticket is released on the holder's success or
//! when its lease expires.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Arbiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Consecutive conflicts before a token is granted the ticket
    pub starvation_threshold: u32,
    /// Ticket lease, in milliseconds
    pub ticket_ttl_ms: u64,
    /// Delay the ticket holder waits between attempts, in milliseconds
    pub expedited_delay_ms: u64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        PriorityConfig {
            starvation_threshold: 3,
            ticket_ttl_ms: 1_000,
            expedited_delay_ms: 0,
        }
    }
}

#[derive(Debug)]
struct Ticket {
    holder: String,
    granted_at: Instant,
}

#[derive(Debug, Default)]
struct ArbiterState {
    conflicts: FxHashMap<String, u32>,
    ticket: Option<Ticket>,
}

impl ArbiterState {
    fn expire(&mut self, ttl: Duration) {
        if let Some(ticket) = &self.ticket {
            if ticket.granted_at.elapsed() >= ttl {
                debug!(holder = %ticket.holder, "Priority ticket lease expired");
                self.ticket = None;
            }
        }
    }
}

/// How a caller should wait before its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    /// Holds the priority ticket
    Expedited,
    /// Another caller holds the ticket
    Yielding,
    /// No ticket outstanding
    Normal,
}

/// Starvation-avoidance arbiter for commit retries.
#[derive(Debug, Default)]
pub struct PriorityArbiter {
    config: PriorityConfig,
    state: Mutex<ArbiterState>,
}

impl PriorityArbiter {
    /// Create an arbiter.
    pub fn new(config: PriorityConfig) -> Self {
        PriorityArbiter {
            config,
            state: Mutex::new(ArbiterState::default()),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ticket_ttl_ms)
    }

    /// Record a conflict for `token`; may grant it the ticket.
    pub fn record_conflict(&self, token: &str) -> Standing {
        let mut state = self.state.lock();
        state.expire(self.ttl());
        let count = {
            let count = state.conflicts.entry(token.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if state.ticket.is_none() && count >= self.config.starvation_threshold {
            warn!(token, conflicts = count, "Priority ticket granted to starved caller");
            state.ticket = Some(Ticket {
                holder: token.to_string(),
                granted_at: Instant::now(),
            });
        }
        Self::standing_locked(&state, Some(token))
    }

    /// Record a successful commit for `token`, releasing its ticket.
    pub fn record_success(&self, token: &str) {
        let mut state = self.state.lock();
        state.conflicts.remove(token);
        if state.ticket.as_ref().is_some_and(|t| t.holder == token) {
            debug!(token, "Priority ticket released");
            state.ticket = None;
        }
    }

    /// Drop everything tracked for `token` after it gave up: its conflict
    /// count and, if it holds one, the ticket.
    pub fn forget(&self, token: &str) {
        let mut state = self.state.lock();
        state.conflicts.remove(token);
        if state.ticket.as_ref().is_some_and(|t| t.holder == token) {
            debug!(token, "Priority ticket surrendered");
            state.ticket = None;
        }
    }

    /// Number of tokens with recorded conflicts.
    pub fn tracked(&self) -> usize {
        self.state.lock().conflicts.len()
    }

    /// Current standing of `token` (`None` for anonymous callers).
    pub fn standing(&self, token: Option<&str>) -> Standing {
        let mut state = self.state.lock();
        state.expire(self.ttl());
        Self::standing_locked(&state, token)
    }

    fn standing_locked(state: &ArbiterState, token: Option<&str>) -> Standing {
        match (&state.ticket, token) {
            (None, _) => Standing::Normal,
            (Some(ticket), Some(token)) if ticket.holder == token => Standing::Expedited,
            (Some(_), _) => Standing::Yielding,
        }
    }

    /// Current ticket holder, if the lease is live.
    pub fn ticket_holder(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.expire(self.ttl());
        state.ticket.as_ref().map(|t| t.holder.clone())
    }

    /// Consecutive conflicts recorded for `token`.
    pub fn conflicts(&self, token: &str) -> u32 {
        self.state.lock().conflicts.get(token).copied().unwrap_or(0)
    }

    /// Adjust a backoff delay for `standing`.
    pub fn adjust_delay(&self, standing: Standing, delay: Duration, base: Duration) -> Duration {
        match standing {
            Standing::Expedited => Duration::from_millis(self.config.expedited_delay_ms),
            Standing::Yielding => delay + base,
            Standing::Normal => delay,
        }
    }
}
