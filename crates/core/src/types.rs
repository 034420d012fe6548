//! Core classification types
//!
//! - [`Version`]: strictly increasing commit counter
//! - [`Layer`]: where a path lives (lifetime/scope)
//! - [`Zone`]: what kind of thing a path is, fixing its capability ceiling

use crate::capability::Capability;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Committed state version
///
/// Every successful commit increments the version by exactly one.
/// The initial (empty) store is at version 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// Version of an empty store.
    pub const ZERO: Version = Version(0);

    /// Wrap a raw counter value.
    pub const fn new(raw: u64) -> Self {
        Version(raw)
    }

    /// Raw counter value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The version a successful commit on top of this one produces.
    pub const fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Version(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Lifetime/scope classification, named by a path's first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Long-lived, read-only to units of work
    Global,
    /// Primary mutable business state, lifetime of the session
    Domain,
    /// Scratch data of one execution, never merged into the tree
    Local,
}

impl Layer {
    /// Segment name of this layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Global => "global",
            Layer::Domain => "domain",
            Layer::Local => "local",
        }
    }
}

impl FromStr for Layer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(Layer::Global),
            "domain" => Ok(Layer::Domain),
            "local" => Ok(Layer::Local),
            other => Err(Error::invalid_path(
                other,
                "first segment must be one of global, domain, local",
            )),
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-of-data classification of a path.
///
/// | Zone | Ceiling |
/// |------|---------|
/// | Data | Read, Append, Update, Delete |
/// | Signal | Read, Append |
/// | Meta | Append, Update, Delete |
/// | Heavy | Read, Update |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// Persisted business fact
    Data,
    /// Ephemeral event/command, cleared each cycle
    Signal,
    /// Diagnostic, observability-only
    Meta,
    /// Bulk payload handle, pointer-swap only, never rolled back
    Heavy,
}

impl Zone {
    /// All zones (for iteration)
    pub const ALL: [Zone; 4] = [Zone::Data, Zone::Signal, Zone::Meta, Zone::Heavy];

    /// Maximum capability any manifest can obtain in this zone.
    pub fn ceiling(&self) -> Capability {
        match self {
            Zone::Data => Capability::READ_WRITE,
            Zone::Signal => Capability::READ | Capability::APPEND,
            // No business logic may depend on diagnostics.
            Zone::Meta => Capability::APPEND | Capability::UPDATE | Capability::DELETE,
            Zone::Heavy => Capability::READ | Capability::UPDATE,
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Data => "data",
            Zone::Signal => "signal",
            Zone::Meta => "meta",
            Zone::Heavy => "heavy",
        }
    }

    /// Is this zone tracked by shadows and rolled back on discard?
    pub fn is_transactional(&self) -> bool {
        !matches!(self, Zone::Heavy)
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "data" => Ok(Zone::Data),
            "signal" => Ok(Zone::Signal),
            "meta" => Ok(Zone::Meta),
            "heavy" => Ok(Zone::Heavy),
            other => Err(Error::config(format!("unknown zone `{}`", other))),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
