//! Versioned storage for the Warden state engine
//!
//! This crate owns the authoritative state tree:
//! - [`VersionedStore`]: atomic, serialized publication of new versions
//! - [`Snapshot`]: immutable root at one version, safe to hold across commits
//! - [`CommitLog`]: bounded history of touched paths for smart validation
//! - [`HeavySlots`]: non-transactional storage for bulk-payload handles

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heavy;
pub mod log;
pub mod snapshot;
pub mod store;

pub use heavy::HeavySlots;
pub use log::{CommitLog, CommitRecord, DEFAULT_HISTORY_LIMIT};
pub use snapshot::Snapshot;
pub use store::{CommitCheck, VersionedStore};
