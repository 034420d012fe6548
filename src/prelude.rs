//! Convenient imports for Warden.
//!
//! ```ignore
//! use warden::prelude::*;
//!
//! let warden = Warden::new()?;
//! warden.register("audit", Manifest::builder().read("domain").build()?);
//! ```

// Main entry point
pub use crate::warden::{Warden, WardenBuilder};

// Error handling
pub use warden_core::{Error, Result};

// Core types
pub use warden_core::{Capability, DeltaOp, Layer, Path, Value, Version, Zone};

// Access control
pub use warden_security::{AccessDefault, Manifest};

// Transactions
pub use warden_concurrency::{CommitMode, Committed, Entry, GuardedView, PriorityConfig, RetryPolicy};

// Policy
pub use warden_policy::{Rule, RulePhase, RuleSet, Severity};

// Execution
pub use warden_engine::{EngineConfig, EngineMetrics, ExecuteOptions, UnitContext};

// Re-export serde_json for convenience
pub use serde_json::json;
