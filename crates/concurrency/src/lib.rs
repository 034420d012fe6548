//! Concurrency layer for the Warden state engine
//!
//! This crate implements optimistic concurrency control with:
//! - [`Transaction`]: shadow-copy workspace with explicit and inferred deltas
//! - [`GuardedView`]: capability-checked access, copy-on-first-write
//! - [`ConflictResolver`]: strict or smart validation plus the retry loop
//! - [`RetryPolicy`]: exponential backoff with jitter and a retry budget
//! - [`PriorityArbiter`]: starvation avoidance via a single priority ticket

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod priority;
pub mod retry;
mod shadow;
pub mod transaction;
pub mod view;

pub use conflict::{CommitMode, Committed, ConflictResolver, ResolverStats};
pub use priority::{PriorityArbiter, PriorityConfig, Standing};
pub use retry::RetryPolicy;
pub use transaction::{Transaction, TransactionStatus};
pub use view::{Entry, GuardedView};
