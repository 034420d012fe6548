//! # Warden
//!
//! In-process, capability-secured, transactional state engine.
//!
//! Units of work read and mutate a versioned state tree through guarded
//! views. Every access is checked against a capability set computed from
//! the path's zone, the unit's declared manifest and its layer. Mutations
//! land in private shadows and are committed atomically under optimistic
//! concurrency control; a policy validator checks inputs and pending
//! outputs around every execution.
//!
//! ## Quick Start
//!
//! ```ignore
//! use warden::prelude::*;
//!
//! let warden = Warden::builder()
//!     .unit("tally", Manifest::builder().write("domain.stats").build()?)
//!     .build()?;
//!
//! warden.execute("tally", Value::Null, |ctx| {
//!     ctx.view_at("domain.stats")?.set("runs", 1)
//! })?;
//! assert_eq!(warden.inspect("domain.stats.runs")?, Some(Value::Int(1)));
//! ```
//!
//! ## Layers
//!
//! - [`warden_core`] - values, paths, capabilities, deltas, errors
//! - [`warden_storage`] - versioned store with structural sharing
//! - [`warden_security`] - zones, manifests, capability resolution
//! - [`warden_concurrency`] - transactions, guarded views, conflicts, retries
//! - [`warden_policy`] - declarative rules and the validator
//! - [`warden_engine`] - unit-of-work execution

#![warn(missing_docs)]

mod warden;

pub mod prelude;

pub use crate::warden::{Warden, WardenBuilder};

pub use warden_concurrency;
pub use warden_core;
pub use warden_engine;
pub use warden_policy;
pub use warden_security;
pub use warden_storage;

pub use warden_core::{Error, Result};
