//! Capability bits
//!
//! A capability set is a bitmask over five independent permissions.
//! Effective access for a path is an intersection of bitmasks, computed
//! once per guarded view and cached for the transaction.
//!
//! ```
//! use warden_core::Capability;
//!
//! let ceiling = Capability::READ | Capability::APPEND;
//! let requested = Capability::READ_WRITE;
//! assert_eq!(ceiling & requested, Capability::READ | Capability::APPEND);
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Permissions on a path.
    ///
    /// | Capability | Operations |
    /// |------------|------------|
    /// | [`READ`](Self::READ) | materialize a value |
    /// | [`APPEND`](Self::APPEND) | push to a sequence, insert a new key |
    /// | [`UPDATE`](Self::UPDATE) | overwrite an existing key |
    /// | [`DELETE`](Self::DELETE) | remove an existing key |
    /// | [`ADMIN`](Self::ADMIN) | bypass every ceiling, inherited by descendants |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capability: u8 {
        /// Read values
        const READ   = 0b0000_0001;
        /// Append to sequences and insert new keys
        const APPEND = 0b0000_0010;
        /// Overwrite existing values
        const UPDATE = 0b0000_0100;
        /// Remove existing values
        const DELETE = 0b0000_1000;
        /// Administrative override
        const ADMIN  = 0b0001_0000;
    }
}

impl Capability {
    /// Every mutating bit.
    pub const WRITE: Self = Self::APPEND.union(Self::UPDATE).union(Self::DELETE);

    /// What a manifest write-list entry requests.
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);

    /// Full capability set granted by Admin.
    pub const FULL: Self = Self::READ_WRITE.union(Self::ADMIN);

    /// Human-readable list of capability names.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::READ) {
            names.push("Read");
        }
        if self.contains(Self::APPEND) {
            names.push("Append");
        }
        if self.contains(Self::UPDATE) {
            names.push("Update");
        }
        if self.contains(Self::DELETE) {
            names.push("Delete");
        }
        if self.contains(Self::ADMIN) {
            names.push("Admin");
        }
        names
    }

    /// Bits of `needed` absent from `self`.
    #[must_use]
    pub fn missing(&self, needed: Self) -> Self {
        needed - *self
    }

    /// Does this set allow any mutation?
    pub fn is_mutable(&self) -> bool {
        self.intersects(Self::WRITE)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}
