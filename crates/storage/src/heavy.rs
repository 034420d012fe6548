//! Heavy-zone slots
//!
//! Bulk-payload handles live outside the versioned tree. A write lands
//! immediately, bumps no version and is never rolled back; writers sharing
//! a slot must coordinate among themselves.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use warden_core::{Path, Value};

/// Non-transactional storage for heavy-zone paths.
#[derive(Debug, Default)]
pub struct HeavySlots {
    slots: DashMap<Path, Value>,
    writes: AtomicU64,
}

impl HeavySlots {
    /// Create empty slot storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new value, returning the previous one.
    pub fn write(&self, path: Path, value: Value) -> Option<Value> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.slots.insert(path, value)
    }

    /// Current value of a slot.
    pub fn read(&self, path: &Path) -> Option<Value> {
        self.slots.get(path).map(|entry| entry.value().clone())
    }

    /// Remove a slot.
    pub fn remove(&self, path: &Path) -> Option<Value> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.slots.remove(path).map(|(_, v)| v)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total writes and removals since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Occupied slot paths, sorted.
    pub fn paths(&self) -> Vec<Path> {
        let mut paths: Vec<Path> = self.slots.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}
