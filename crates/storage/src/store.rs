//! Versioned store
//!
//! Holds the authoritative state tree and publishes new versions
//! atomically.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire commit lock (also guards the commit log)
//! 2. Run the caller's validation against the current version
//! 3. Copy the current root (O(1): containers are shared)
//! 4. Apply deltas to the copy; on failure publish nothing
//! 5. Record touched paths in the commit log
//! 6. Swap the published snapshot
//! 7. Release commit lock, return the new version
//! ```
//!
//! Readers never take the commit lock. They clone the published
//! `Arc<Snapshot>` under a short read lock and keep observing that version
//! no matter how many commits follow.

use crate::heavy::HeavySlots;
use crate::log::{CommitLog, CommitRecord, DEFAULT_HISTORY_LIMIT};
use crate::snapshot::Snapshot;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::delta::apply_all;
use warden_core::{Delta, DeltaOp, Error, Path, Result, Value, Version};

/// View of commit state handed to validation inside the commit lock.
pub struct CommitCheck<'a> {
    current: Version,
    log: &'a CommitLog,
}

impl CommitCheck<'_> {
    /// Version the commit will be applied on top of.
    pub fn current_version(&self) -> Version {
        self.current
    }

    /// Every (version, path) written after `base`.
    pub fn touched_since(&self, base: Version) -> Result<Vec<(Version, &Path)>> {
        self.log.touched_since(base)
    }
}

/// Authoritative versioned state tree.
///
/// # Thread Safety
///
/// Commits are serialized by the commit lock. Validation and apply happen
/// under the same lock, so no commit can slip in between a check and the
/// publish that relies on it.
pub struct VersionedStore {
    /// Published snapshot
    current: RwLock<Arc<Snapshot>>,

    /// Commit serialization lock and bounded history
    log: Mutex<CommitLog>,

    /// Non-transactional heavy-zone storage
    heavy: HeavySlots,
}

impl VersionedStore {
    /// Empty store at version 0.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Empty store retaining `limit` commit records.
    pub fn with_history_limit(limit: usize) -> Self {
        Self::seeded(Value::object(), limit)
    }

    /// Store at version 0 holding `root`.
    ///
    /// Used to load global configuration before any unit of work runs.
    pub fn seeded(root: Value, limit: usize) -> Self {
        let root = if root.is_null() { Value::object() } else { root };
        VersionedStore {
            current: RwLock::new(Arc::new(Snapshot::new(root, Version::ZERO))),
            log: Mutex::new(CommitLog::new(limit)),
            heavy: HeavySlots::new(),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// The current version.
    pub fn version(&self) -> Version {
        self.current.read().version()
    }

    /// Read the current value at `path`.
    pub fn read(&self, path: &Path) -> Option<Value> {
        self.snapshot().read(path)
    }

    /// Read `path` from a snapshot captured earlier.
    pub fn read_at(snapshot: &Snapshot, path: &Path) -> Option<Value> {
        snapshot.read(path)
    }

    /// Strict commit: publish only if the current version is `expected`.
    pub fn commit(&self, expected: Version, deltas: &[Delta]) -> Result<Version> {
        self.commit_with(deltas, |check| {
            if check.current_version() != expected {
                return Err(Error::VersionMismatch {
                    expected,
                    actual: check.current_version(),
                });
            }
            Ok(())
        })
    }

    /// Publish `deltas` as one version after `check` approves.
    ///
    /// Either every delta becomes visible at the returned version or none
    /// does.
    pub fn commit_with<F>(&self, deltas: &[Delta], check: F) -> Result<Version>
    where
        F: FnOnce(&CommitCheck<'_>) -> Result<()>,
    {
        let mut log = self.log.lock();
        let base = self.snapshot();

        check(&CommitCheck {
            current: base.version(),
            log: &*log,
        })?;

        let mut root = base.root().clone();
        if let Err(e) = apply_all(&mut root, deltas) {
            warn!(error = %e, version = %base.version(), "Commit rejected while applying deltas");
            return Err(e);
        }

        let version = base.version().next();
        let touched: BTreeSet<Path> = deltas.iter().map(|d| d.path.clone()).collect();
        log.push(CommitRecord {
            version,
            touched: touched.into_iter().collect(),
            committed_at: Utc::now(),
        });

        *self.current.write() = Arc::new(Snapshot::new(root, version));

        debug!(version = %version, deltas = deltas.len(), "Committed");
        Ok(version)
    }

    /// Paths touched by commits after `base`.
    pub fn touched_since(&self, base: Version) -> Result<Vec<(Version, Path)>> {
        let log = self.log.lock();
        Ok(log
            .touched_since(base)?
            .into_iter()
            .map(|(v, p)| (v, p.clone()))
            .collect())
    }

    /// Number of commit records retained.
    pub fn history_len(&self) -> usize {
        self.log.lock().len()
    }

    /// Heavy-zone slots.
    pub fn heavy(&self) -> &HeavySlots {
        &self.heavy
    }

    /// Delete every object key whose name satisfies `matches`, as one commit.
    ///
    /// Returns `None` when nothing matched; no version is consumed then.
    pub fn clear_matching<F>(&self, matches: F) -> Result<Option<Version>>
    where
        F: Fn(&str) -> bool,
    {
        let snapshot = self.snapshot();
        let mut doomed = Vec::new();
        collect_matching(&Path::root(), snapshot.root(), &matches, &mut doomed);
        if doomed.is_empty() {
            return Ok(None);
        }

        let deltas: Vec<Delta> = doomed
            .into_iter()
            .map(|path| Delta::explicit(path, DeltaOp::Delete))
            .collect();
        // Deleting an already-deleted key is a no-op, so no version check.
        let version = self.commit_with(&deltas, |_| Ok(()))?;
        debug!(version = %version, cleared = deltas.len(), "Cleared matching keys");
        Ok(Some(version))
    }
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("version", &self.version())
            .field("heavy_slots", &self.heavy.len())
            .finish()
    }
}

fn collect_matching<F>(at: &Path, node: &Value, matches: &F, out: &mut Vec<Path>)
where
    F: Fn(&str) -> bool,
{
    let Some(map) = node.as_object() else {
        return;
    };
    for (key, child) in map.iter() {
        let Ok(path) = at.child(key.as_str()) else {
            continue;
        };
        if matches(key) {
            out.push(path);
        } else {
            collect_matching(&path, child, matches, out);
        }
    }
}
