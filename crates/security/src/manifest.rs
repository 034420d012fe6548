//! Unit-of-work manifests
//!
//! A manifest is the static access declaration a unit of work registers
//! with: paths it reads, paths it writes, an optional admin flag and the
//! error identifiers it may raise.
//!
//! An entry covers the declared path and everything below it. Read entries
//! request {Read}; write entries request {Read, Append, Update, Delete}.
//! Overlapping entries union their requests.
//!
//! ```
//! use warden_security::Manifest;
//!
//! let manifest = Manifest::builder()
//!     .read("global.rates")
//!     .write("domain.order")
//!     .build()
//!     .unwrap();
//! assert_eq!(manifest.writes().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use warden_core::{Capability, Path, Result};

/// Declared access for one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    reads: Vec<Path>,
    writes: Vec<Path>,
    admin: bool,
    errors: Vec<String>,
}

impl Manifest {
    /// Start building a manifest.
    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::default()
    }

    /// Manifest with no declarations.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declared read paths, in declaration order.
    pub fn reads(&self) -> &[Path] {
        &self.reads
    }

    /// Declared write paths, in declaration order.
    pub fn writes(&self) -> &[Path] {
        &self.writes
    }

    /// Is the admin override requested?
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Declared error identifiers.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Union of capabilities requested by entries covering `path`.
    ///
    /// `None` when no entry covers it.
    pub fn requested(&self, path: &Path) -> Option<Capability> {
        let mut requested: Option<Capability> = None;
        for entry in &self.reads {
            if path.starts_with(entry) {
                requested = Some(requested.unwrap_or_else(Capability::empty) | Capability::READ);
            }
        }
        for entry in &self.writes {
            if path.starts_with(entry) {
                requested =
                    Some(requested.unwrap_or_else(Capability::empty) | Capability::READ_WRITE);
            }
        }
        requested
    }

    /// Is `path` a strict ancestor of some declared entry?
    ///
    /// Such paths may be navigated through but not materialized.
    pub fn leads_to_entry(&self, path: &Path) -> bool {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .any(|entry| path.is_ancestor_of(entry))
    }

    /// Is `path` covered by a write entry?
    pub fn declares_write(&self, path: &Path) -> bool {
        self.writes.iter().any(|entry| path.starts_with(entry))
    }
}

/// Builder for [`Manifest`].
///
/// Paths are validated in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    reads: Vec<String>,
    writes: Vec<String>,
    admin: bool,
    errors: Vec<String>,
}

impl ManifestBuilder {
    /// Declare a read path.
    pub fn read(mut self, path: impl Into<String>) -> Self {
        self.reads.push(path.into());
        self
    }

    /// Declare a write path.
    pub fn write(mut self, path: impl Into<String>) -> Self {
        self.writes.push(path.into());
        self
    }

    /// Request the admin override.
    pub fn admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Declare an error identifier the unit may raise.
    pub fn error(mut self, id: impl Into<String>) -> Self {
        self.errors.push(id.into());
        self
    }

    /// Validate every path and produce the manifest.
    pub fn build(self) -> Result<Manifest> {
        let parse = |list: Vec<String>| -> Result<Vec<Path>> {
            list.iter().map(|p| p.parse::<Path>()).collect()
        };
        Ok(Manifest {
            reads: parse(self.reads)?,
            writes: parse(self.writes)?,
            admin: self.admin,
            errors: self.errors,
        })
    }
}
