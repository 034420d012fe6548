//! Access control for the Warden state engine.
//!
//! This crate decides what a unit of work may do at a path:
//! - [`ZoneTable`]: classifies a path by its final segment
//! - [`Manifest`]: the read/write lists a unit of work declares
//! - [`CapabilityResolver`]: intersects zone ceiling, manifest and layer
//! - [`AccessDefault`]: what undeclared paths resolve to

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manifest;
pub mod resolver;
pub mod zone;

pub use manifest::{Manifest, ManifestBuilder};
pub use resolver::CapabilityResolver;
pub use zone::ZoneTable;

use serde::{Deserialize, Serialize};

/// What a path absent from every manifest list resolves to.
///
/// Hard denial is the default. The permissive mode is an explicit opt-in
/// for auditor and inspection contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDefault {
    /// Undeclared access fails with `CapabilityDenied`
    #[default]
    Deny,
    /// Undeclared paths resolve to {Read}, still clipped by the zone ceiling
    ReadOnly,
}
