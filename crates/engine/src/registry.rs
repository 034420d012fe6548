//! Unit-of-work registry

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use warden_core::{Error, Result};
use warden_security::Manifest;

/// Manifests keyed by unit-of-work identifier.
///
/// Lookups hand out an `Arc`, so re-registering a unit never affects an
/// execution that already resolved its manifest.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    manifests: DashMap<String, Arc<Manifest>>,
}

impl ManifestRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the manifest for `unit`.
    ///
    /// Returns the manifest it replaced.
    pub fn register(&self, unit: impl Into<String>, manifest: Manifest) -> Option<Arc<Manifest>> {
        let unit = unit.into();
        let previous = self.manifests.insert(unit.clone(), Arc::new(manifest));
        if previous.is_some() {
            info!(unit = %unit, "Unit manifest replaced");
        } else {
            debug!(unit = %unit, "Unit registered");
        }
        previous
    }

    /// Remove `unit`.
    pub fn unregister(&self, unit: &str) -> Option<Arc<Manifest>> {
        self.manifests.remove(unit).map(|(_, manifest)| manifest)
    }

    /// Manifest for `unit`, or `UnknownUnit`.
    pub fn get(&self, unit: &str) -> Result<Arc<Manifest>> {
        self.manifests
            .get(unit)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownUnit {
                unit: unit.to_string(),
            })
    }

    /// Is `unit` registered?
    pub fn contains(&self, unit: &str) -> bool {
        self.manifests.contains_key(unit)
    }

    /// Registered identifiers, sorted.
    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.manifests.iter().map(|e| e.key().clone()).collect();
        units.sort();
        units
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
