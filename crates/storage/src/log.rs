//! Commit log
//!
//! Bounded history of which paths each commit touched. Smart commit
//! validation intersects a transaction's write set with the paths touched
//! after its base version; once that range is evicted the check cannot be
//! made and reports [`Error::HistoryTrimmed`].

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use warden_core::{Error, Path, Result, Version};

/// Default number of commits retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// What one commit changed.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    /// Version produced by the commit
    pub version: Version,
    /// Deduplicated paths written by the commit
    pub touched: Vec<Path>,
    /// Wall-clock time of the commit
    pub committed_at: DateTime<Utc>,
}

/// Bounded, version-ordered commit history.
#[derive(Debug)]
pub struct CommitLog {
    records: VecDeque<CommitRecord>,
    limit: usize,
    /// Highest version whose record has been evicted
    evicted_through: Version,
}

impl CommitLog {
    /// Create a log retaining at most `limit` records (minimum 1).
    pub fn new(limit: usize) -> Self {
        CommitLog {
            records: VecDeque::new(),
            limit: limit.max(1),
            evicted_through: Version::ZERO,
        }
    }

    /// Retained record count.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no commits are retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest version whose record is still retained.
    pub fn earliest_retained(&self) -> Version {
        self.evicted_through.next()
    }

    /// Append a record, evicting the oldest beyond the limit.
    pub fn push(&mut self, record: CommitRecord) {
        self.records.push_back(record);
        while self.records.len() > self.limit {
            if let Some(evicted) = self.records.pop_front() {
                self.evicted_through = evicted.version;
            }
        }
    }

    /// Every (version, path) touched by commits after `base`.
    pub fn touched_since(&self, base: Version) -> Result<Vec<(Version, &Path)>> {
        if base < self.evicted_through {
            return Err(Error::HistoryTrimmed {
                requested: base,
                earliest: self.earliest_retained(),
            });
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.version > base)
            .flat_map(|r| r.touched.iter().map(move |p| (r.version, p)))
            .collect())
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &CommitRecord> {
        self.records.iter()
    }
}

impl Default for CommitLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
