//! Capability resolution
//!
//! Effective capability for a path is the intersection of three axes:
//!
//! ```text
//! effective = zone ceiling ∩ manifest request ∩ layer cap
//! ```
//!
//! Admin bypasses the intersection and yields the full set, which guarded
//! views then inherit verbatim for every descendant.
//!
//! | Layer | Cap for units of work |
//! |-------|-----------------------|
//! | global | {Read} |
//! | domain | manifest request |
//! | local | {Read, Append, Update, Delete} (execution scratch, never committed) |
//!
//! A heavy slot holds one opaque value, so every path below a heavy key
//! resolves under the heavy ceiling too.
//!
//! Resolution is deterministic and has no side effects.

use crate::manifest::Manifest;
use crate::zone::ZoneTable;
use crate::AccessDefault;
use warden_core::{Capability, Error, Layer, Path, Result, Zone};

/// Computes effective capabilities from the zone table and access default.
#[derive(Debug, Clone, Default)]
pub struct CapabilityResolver {
    zones: ZoneTable,
    default: AccessDefault,
}

impl CapabilityResolver {
    /// Create a resolver.
    pub fn new(zones: ZoneTable, default: AccessDefault) -> Self {
        CapabilityResolver { zones, default }
    }

    /// The zone table in use.
    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    /// The undeclared-path policy in use.
    pub fn access_default(&self) -> AccessDefault {
        self.default
    }

    /// Effective capability set for `path`.
    ///
    /// Strict ancestors of declared entries resolve to the empty set: they
    /// can be navigated through but not read. Undeclared paths fail under
    /// [`AccessDefault::Deny`].
    pub fn resolve(&self, path: &Path, manifest: &Manifest, admin: bool) -> Result<Capability> {
        if admin {
            return Ok(Capability::FULL);
        }
        if path.is_root() {
            return Ok(match self.default {
                AccessDefault::ReadOnly => Capability::READ,
                AccessDefault::Deny => Capability::empty(),
            });
        }

        let layer = path
            .layer()
            .ok_or_else(|| Error::invalid_path(path.to_string(), "unknown layer"))?;
        let zone = self.zone_of(path);

        let requested = match layer {
            Layer::Local => Capability::READ_WRITE,
            Layer::Global | Layer::Domain => match manifest.requested(path) {
                Some(requested) => requested,
                None => match self.default {
                    AccessDefault::ReadOnly => Capability::READ,
                    AccessDefault::Deny if manifest.leads_to_entry(path) => Capability::empty(),
                    AccessDefault::Deny => {
                        return Err(Error::CapabilityDenied {
                            path: path.clone(),
                            missing: Capability::READ,
                            grant_hint: format!(
                                "undeclared; add `{}` to the manifest reads or writes list",
                                path
                            ),
                        })
                    }
                },
            },
        };

        let layer_cap = match layer {
            Layer::Global => Capability::READ,
            Layer::Domain | Layer::Local => Capability::READ_WRITE,
        };

        Ok(requested & layer_cap & zone.ceiling())
    }

    /// Check `have` contains `needed`, naming the grant that would fix it.
    pub fn require(
        &self,
        path: &Path,
        manifest: &Manifest,
        have: Capability,
        needed: Capability,
    ) -> Result<()> {
        let missing = have.missing(needed);
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::CapabilityDenied {
            path: path.clone(),
            missing,
            grant_hint: self.grant_hint(path, manifest, missing),
        })
    }

    /// Explain which declaration would grant `missing` on `path`, or why
    /// none can.
    pub fn grant_hint(&self, path: &Path, manifest: &Manifest, missing: Capability) -> String {
        let zone = self.zone_of(path);
        let beyond_ceiling = zone.ceiling().missing(missing);
        if !beyond_ceiling.is_empty() {
            return format!(
                "zone {} ceiling {} never grants {}",
                zone,
                zone.ceiling(),
                beyond_ceiling
            );
        }
        if path.layer() == Some(Layer::Global) && missing.is_mutable() {
            return "global layer is read-only to units of work".to_string();
        }
        if manifest.leads_to_entry(path) && manifest.requested(path).is_none() {
            return format!("`{}` is only a parent of declared paths", path);
        }
        if missing == Capability::READ {
            format!("declare `{}` in the manifest reads list", path)
        } else {
            format!("declare `{}` in the manifest writes list", path)
        }
    }

    /// Zone for `path`. Anything below a heavy key is heavy.
    pub fn zone_of(&self, path: &Path) -> Zone {
        if self.zones.heavy_root(path).is_some() {
            return Zone::Heavy;
        }
        self.zones.zone_of(path)
    }

    /// Heavy key at or above `path`, if any.
    pub fn heavy_root(&self, path: &Path) -> Option<Path> {
        self.zones.heavy_root(path)
    }
}
