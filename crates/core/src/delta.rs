//! Recorded and inferred changes
//!
//! A [`Delta`] is a single change destined for commit. Deltas are either
//! recorded explicitly by a unit of work or inferred by deep-diffing a
//! shadow against the value it was copied from ([`diff`]).
//!
//! ## Diff granularity
//!
//! - objects are compared key by key, recursing into shared keys
//! - an array that only grew at the end yields one `Append` per new element
//! - any other array change replaces the whole array
//! - a removed key yields `Delete`, a changed key yields `Set`
//! - an added object yields one `Set` per leaf, so two writers filling in
//!   siblings under a new parent touch disjoint paths

use crate::error::{Error, Result};
use crate::path::Path;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation carried by a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Replace (or create) the value at the path
    Set(Value),
    /// Push onto the sequence at the path
    Append(Value),
    /// Remove the value at the path
    Delete,
}

impl DeltaOp {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            DeltaOp::Set(_) => "set",
            DeltaOp::Append(_) => "append",
            DeltaOp::Delete => "delete",
        }
    }

    /// Value written by this op, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            DeltaOp::Set(v) | DeltaOp::Append(v) => Some(v),
            DeltaOp::Delete => None,
        }
    }
}

/// Where a delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOrigin {
    /// Stated by the unit of work
    Explicit,
    /// Found by diffing a shadow at commit time
    Inferred,
}

/// A single change destined for commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Absolute path of the change
    pub path: Path,
    /// What happens at the path
    pub op: DeltaOp,
    /// Explicit or inferred
    pub origin: DeltaOrigin,
}

impl Delta {
    /// Explicit delta.
    pub fn explicit(path: Path, op: DeltaOp) -> Self {
        Delta {
            path,
            op,
            origin: DeltaOrigin::Explicit,
        }
    }

    /// Inferred delta.
    pub fn inferred(path: Path, op: DeltaOp) -> Self {
        Delta {
            path,
            op,
            origin: DeltaOrigin::Inferred,
        }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            DeltaOp::Set(v) => write!(f, "set {} = {}", self.path, v),
            DeltaOp::Append(v) => write!(f, "append {} += {}", self.path, v),
            DeltaOp::Delete => write!(f, "delete {}", self.path),
        }
    }
}

/// Deep-compare `original` and `current` (both rooted at `base`) and emit
/// an inferred delta for every difference.
///
/// `None` means the value does not exist.
pub fn diff(base: &Path, original: Option<&Value>, current: Option<&Value>, out: &mut Vec<Delta>) {
    match (original, current) {
        (None, None) => {}
        (Some(_), None) => out.push(Delta::inferred(base.clone(), DeltaOp::Delete)),
        (None, Some(now)) => added(base, now, out),
        (Some(before), Some(now)) => diff_values(base, before, now, out),
    }
}

/// Deltas creating `now` where nothing existed. Empty objects and
/// non-objects are written whole.
fn added(base: &Path, now: &Value, out: &mut Vec<Delta>) {
    match now {
        Value::Object(map) if !map.is_empty() => {
            for (key, value) in map.iter() {
                let child = base.join(&Path::from_valid(std::slice::from_ref(key)));
                added(&child, value, out);
            }
        }
        _ => out.push(Delta::inferred(base.clone(), DeltaOp::Set(now.clone()))),
    }
}

fn diff_values(base: &Path, before: &Value, now: &Value, out: &mut Vec<Delta>) {
    match (before, now) {
        (Value::Object(a), Value::Object(b)) => {
            if std::sync::Arc::ptr_eq(a, b) {
                return;
            }
            for (key, old) in a.iter() {
                let child = base.join(&Path::from_valid(std::slice::from_ref(key)));
                match b.get(key) {
                    Some(new) => diff_values(&child, old, new, out),
                    None => out.push(Delta::inferred(child, DeltaOp::Delete)),
                }
            }
            for (key, new) in b.iter() {
                if !a.contains_key(key) {
                    let child = base.join(&Path::from_valid(std::slice::from_ref(key)));
                    added(&child, new, out);
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            if std::sync::Arc::ptr_eq(a, b) {
                return;
            }
            let grew_at_end = b.len() >= a.len()
                && a.iter().zip(b.iter()).all(|(x, y)| x.identical(y));
            if grew_at_end {
                for item in &b[a.len()..] {
                    out.push(Delta::inferred(base.clone(), DeltaOp::Append(item.clone())));
                }
            } else {
                out.push(Delta::inferred(base.clone(), DeltaOp::Set(now.clone())));
            }
        }
        _ => {
            if !before.identical(now) {
                out.push(Delta::inferred(base.clone(), DeltaOp::Set(now.clone())));
            }
        }
    }
}

/// Apply one delta to a tree root.
///
/// `Set` creates missing intermediate objects. `Append` on a missing path
/// creates the sequence. `Delete` of a missing path is a no-op.
pub fn apply(root: &mut Value, delta: &Delta) -> Result<()> {
    let segments = delta.path.segments();
    match &delta.op {
        DeltaOp::Set(value) => {
            let Some((last, parents)) = segments.split_last() else {
                *root = value.clone();
                return Ok(());
            };
            let parent_path = Path::from_valid(parents);
            let parent = root.descend_or_create(&Path::root(), parents)?;
            parent.insert_child(&parent_path, last, value.clone())?;
            Ok(())
        }
        DeltaOp::Append(value) => {
            let node = root.descend_or_create(&Path::root(), segments)?;
            node.push(&delta.path, value.clone())
        }
        DeltaOp::Delete => {
            let Some((last, parents)) = segments.split_last() else {
                return Err(Error::invalid_path("<root>", "cannot delete the tree root"));
            };
            if root.get_path(parents).is_none() {
                return Ok(());
            }
            let parent_path = Path::from_valid(parents);
            let parent = root.descend_or_create(&Path::root(), parents)?;
            parent.remove_child(&parent_path, last)?;
            Ok(())
        }
    }
}

/// Apply a batch of deltas in order.
pub fn apply_all<'a, I>(root: &mut Value, deltas: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Delta>,
{
    for delta in deltas {
        apply(root, delta)?;
    }
    Ok(())
}
