//! Guarded views
//!
//! A [`GuardedView`] is the only handle a unit of work gets on the state
//! tree. It pairs a path with the capability set resolved for it and checks
//! that set on every access. Values come out as owned copies; nothing
//! returned by a view aliases the transaction's shadows.
//!
//! Child views re-resolve their capability set, except under Admin, where
//! the parent's full set is inherited verbatim at any depth.

use crate::transaction::TxnShared;
use std::fmt;
use std::sync::Arc;
use warden_core::{Capability, Path, Result, Value};

/// Result of [`GuardedView::get`].
#[derive(Debug, Clone)]
pub enum Entry {
    /// The child is a container; navigate further through the view
    View(GuardedView),
    /// The child is a scalar
    Value(Value),
    /// Nothing exists at the child path
    Absent,
}

impl Entry {
    /// The view, if the child is a container.
    pub fn into_view(self) -> Option<GuardedView> {
        match self {
            Entry::View(view) => Some(view),
            _ => None,
        }
    }

    /// The scalar, if the child is one.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Entry::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Is the child absent?
    pub fn is_absent(&self) -> bool {
        matches!(self, Entry::Absent)
    }
}

/// Capability-checked handle on one path of a transaction.
#[derive(Clone)]
pub struct GuardedView {
    txn: Arc<TxnShared>,
    path: Path,
    caps: Capability,
}

impl GuardedView {
    pub(crate) fn new(txn: Arc<TxnShared>, path: Path, caps: Capability) -> Self {
        GuardedView { txn, path, caps }
    }

    /// Path this view is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capability set resolved for this path.
    pub fn capabilities(&self) -> Capability {
        self.caps
    }

    /// View of a child path. The child need not exist yet.
    pub fn child(&self, segment: &str) -> Result<GuardedView> {
        let path = self.path.child(segment)?;
        TxnShared::check_layer(&path)?;
        let caps = if self.txn.is_admin() {
            self.caps
        } else {
            self.txn.capability(&path)?
        };
        Ok(GuardedView::new(Arc::clone(&self.txn), path, caps))
    }

    /// View of a dot-separated descendant.
    pub fn at(&self, relative: &str) -> Result<GuardedView> {
        let relative: Path = relative.parse()?;
        let mut view = self.clone();
        for segment in relative.segments() {
            view = view.child(segment)?;
        }
        Ok(view)
    }

    /// Navigate to a child: a view for containers, the value for scalars.
    ///
    /// Scalars and absence require Read on the child.
    pub fn get(&self, segment: &str) -> Result<Entry> {
        let child = self.child(segment)?;
        match self.txn.peek(&child.path)? {
            Some(value) if value.is_container() => Ok(Entry::View(child)),
            _ => match child.read()? {
                Some(value) => Ok(Entry::Value(value)),
                None => Ok(Entry::Absent),
            },
        }
    }

    /// Materialize the value at this path.
    pub fn read(&self) -> Result<Option<Value>> {
        self.txn.read(&self.path, self.caps)
    }

    /// Materialize a child value.
    pub fn value(&self, segment: &str) -> Result<Option<Value>> {
        self.child(segment)?.read()
    }

    /// Does a child exist? Requires Read on the child.
    pub fn contains(&self, segment: &str) -> Result<bool> {
        Ok(self.value(segment)?.is_some())
    }

    /// Set a child: Update if it exists, Append if it is new.
    pub fn set(&self, segment: &str, value: impl Into<Value>) -> Result<()> {
        let target = self.path.child(segment)?;
        TxnShared::check_layer(&target)?;
        self.txn.set(&self.path, &target, value.into())
    }

    /// Push onto the sequence at this path. Requires Append.
    pub fn append(&self, value: impl Into<Value>) -> Result<()> {
        self.txn.append(&self.path, self.caps, value.into())
    }

    /// Delete a child. Requires Delete; returns whether it existed.
    pub fn delete(&self, segment: &str) -> Result<bool> {
        let target = self.path.child(segment)?;
        TxnShared::check_layer(&target)?;
        self.txn.delete(&self.path, &target)
    }

    /// Mutate a child in place.
    ///
    /// `f` works on a copy. Afterwards the change is diffed and every
    /// changed path is checked against its capability set; if any check
    /// fails nothing is kept and `CapabilityDenied` is returned.
    pub fn modify<R, F>(&self, segment: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Value) -> R,
    {
        let target = self.path.child(segment)?;
        TxnShared::check_layer(&target)?;
        self.txn.modify(&self.path, &target, f)
    }
}

impl fmt::Debug for GuardedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedView")
            .field("path", &self.path)
            .field("caps", &self.caps)
            .finish()
    }
}
