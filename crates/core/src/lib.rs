//! Core types for the Warden state engine
//!
//! This crate defines the vocabulary shared by every layer:
//! - [`Value`]: structurally shared state-tree node
//! - [`Path`]: validated dot-separated address
//! - [`Version`], [`Layer`], [`Zone`]: versioning and classification
//! - [`Capability`]: permission bits
//! - [`Delta`]: recorded or inferred change, plus deep [`diff`](delta::diff)
//! - [`Error`]: the engine-wide error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod delta;
pub mod error;
pub mod path;
pub mod types;
pub mod value;

pub use capability::Capability;
pub use delta::{Delta, DeltaOp, DeltaOrigin};
pub use error::{Error, Result};
pub use path::Path;
pub use types::{Layer, Version, Zone};
pub use value::{PayloadHandle, Value};
