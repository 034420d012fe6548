//! Immutable published state
//!
//! A [`Snapshot`] pairs a tree root with the version that produced it.
//! Snapshots are published behind an `Arc` and never mutated; a reader
//! holding one observes a single consistent version for as long as it
//! keeps the `Arc`.

use warden_core::{Path, Value, Version};

/// Root of the state tree at one version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: Value,
    version: Version,
}

impl Snapshot {
    /// Empty tree at version 0.
    pub fn empty() -> Self {
        Snapshot {
            root: Value::object(),
            version: Version::ZERO,
        }
    }

    pub(crate) fn new(root: Value, version: Version) -> Self {
        Snapshot { root, version }
    }

    /// Version that produced this root.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The whole tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Borrow the value at `path`.
    pub fn get(&self, path: &Path) -> Option<&Value> {
        self.root.get_path(path.segments())
    }

    /// Owned copy of the value at `path`.
    ///
    /// Containers are shared by reference, so this is O(1).
    pub fn read(&self, path: &Path) -> Option<Value> {
        self.get(path).cloned()
    }

    /// Does a value exist at `path`?
    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
