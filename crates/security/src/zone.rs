//! Zone classification
//!
//! A path's zone is a pure function of its final segment:
//!
//! 1. an explicit annotation for the exact name wins
//! 2. otherwise the prefix convention: `sig_` signal, `meta_` meta,
//!    `heavy_` heavy
//! 3. otherwise data
//!
//! Once a name has a zone it keeps it. Moving a name to another zone is a
//! breaking schema change and goes through [`ZoneTable::reassign`] with a
//! newer schema version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use warden_core::{Error, Path, Result, Zone};

const CONVENTIONS: [(&str, Zone); 3] = [
    ("sig_", Zone::Signal),
    ("meta_", Zone::Meta),
    ("heavy_", Zone::Heavy),
];

/// Final-segment name to zone mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneTable {
    annotations: BTreeMap<String, Zone>,
    schema_version: u32,
}

impl ZoneTable {
    /// Table with no annotations at schema version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zone for a final-segment name.
    pub fn classify(&self, name: &str) -> Zone {
        self.assigned(name).unwrap_or(Zone::Data)
    }

    /// Zone for a path. The root classifies as data.
    pub fn zone_of(&self, path: &Path) -> Zone {
        path.last().map_or(Zone::Data, |name| self.classify(name))
    }

    /// Nearest path at or above `path` whose final segment is heavy.
    pub fn heavy_root(&self, path: &Path) -> Option<Path> {
        let segments = path.segments();
        let depth = segments
            .iter()
            .position(|name| self.classify(name) == Zone::Heavy)?;
        Path::from_segments(segments[..=depth].iter().cloned()).ok()
    }

    /// Zone explicitly assigned by annotation or convention.
    fn assigned(&self, name: &str) -> Option<Zone> {
        if let Some(zone) = self.annotations.get(name) {
            return Some(*zone);
        }
        CONVENTIONS
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, zone)| *zone)
    }

    /// Assign a zone to a name.
    ///
    /// Repeating an existing assignment is a no-op; a different zone for an
    /// already-assigned name fails with `ZoneReassigned`.
    pub fn annotate(&mut self, name: impl Into<String>, zone: Zone) -> Result<()> {
        let name = name.into();
        match self.assigned(&name) {
            Some(current) if current != zone => Err(Error::ZoneReassigned {
                name,
                current,
                requested: zone,
            }),
            Some(_) => Ok(()),
            None => {
                self.annotations.insert(name, zone);
                Ok(())
            }
        }
    }

    /// Builder-style [`annotate`](Self::annotate).
    pub fn with(mut self, name: impl Into<String>, zone: Zone) -> Result<Self> {
        self.annotate(name, zone)?;
        Ok(self)
    }

    /// Move a name to another zone as part of a schema change.
    ///
    /// `schema_version` must be strictly newer than the table's.
    pub fn reassign(&mut self, name: impl Into<String>, zone: Zone, schema_version: u32) -> Result<()> {
        let name = name.into();
        if schema_version <= self.schema_version {
            return Err(Error::ZoneReassigned {
                current: self.classify(&name),
                name,
                requested: zone,
            });
        }
        info!(
            name = %name,
            from = %self.classify(&name),
            to = %zone,
            schema_version,
            "Zone reassigned"
        );
        self.annotations.insert(name, zone);
        self.schema_version = schema_version;
        Ok(())
    }

    /// Current schema version.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Explicit annotations, sorted by name.
    pub fn annotations(&self) -> impl Iterator<Item = (&str, Zone)> {
        self.annotations.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
