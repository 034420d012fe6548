//! Shadow copies
//!
//! A [`Shadow`] is a transaction's private copy of one subtree, taken from
//! the base snapshot the first time something below it is mutated. The copy
//! is free: containers are shared with the snapshot until a write copies
//! the containers on the path to the written node.
//!
//! Every mutator checks the write is structurally possible before touching
//! the tree, so a rejected write leaves the shadow exactly as it was.

use warden_core::delta::diff;
use warden_core::{Delta, Error, Path, Result, Value};

/// Private copy of one subtree.
#[derive(Debug, Clone)]
pub(crate) struct Shadow {
    /// Value at the shadow root in the base snapshot
    original: Option<Value>,
    /// Value as mutated by the transaction
    current: Option<Value>,
}

impl Shadow {
    pub(crate) fn new(original: Option<Value>) -> Self {
        Shadow {
            current: original.clone(),
            original,
        }
    }

    /// Current value at `rel` below the shadow root.
    pub(crate) fn get(&self, rel: &[String]) -> Option<&Value> {
        self.current.as_ref()?.get_path(rel)
    }

    /// Set the value at `rel`, creating missing parents.
    pub(crate) fn set(&mut self, root: &Path, rel: &[String], value: Value) -> Result<()> {
        let Some((last, parents)) = rel.split_last() else {
            self.current = Some(value);
            return Ok(());
        };
        let receiver = probe(self.current.as_ref(), root, parents)?;
        let receiver_path = join(root, parents)?;
        match receiver {
            Some(Value::Array(items)) => {
                check_index(&receiver_path, last, items.len())?;
            }
            Some(Value::Object(_)) | Some(Value::Null) | None => {}
            Some(other) => return Err(wrong_type(receiver_path, "Object", other)),
        }

        let node = self.current.get_or_insert(Value::Null);
        let parent = node.descend_or_create(root, parents)?;
        parent.insert_child(&receiver_path, last, value)?;
        Ok(())
    }

    /// Remove the value at `rel`. Returns whether something was removed.
    pub(crate) fn remove(&mut self, root: &Path, rel: &[String]) -> Result<bool> {
        let Some((last, parents)) = rel.split_last() else {
            let existed = self.current.is_some();
            self.current = None;
            return Ok(existed);
        };
        let receiver_path = join(root, parents)?;
        let Some(receiver) = self.current.as_ref().and_then(|v| v.get_path(parents)) else {
            return Ok(false);
        };
        match receiver {
            Value::Object(map) if !map.contains_key(last.as_str()) => return Ok(false),
            Value::Object(_) => {}
            Value::Array(items) => {
                let index = parse_index(&receiver_path, last)?;
                if index >= items.len() {
                    return Ok(false);
                }
            }
            Value::Null => return Ok(false),
            other => return Err(wrong_type(receiver_path, "Object", other)),
        }

        let Some(node) = self.current.as_mut() else {
            return Ok(false);
        };
        let parent = node.descend_or_create(root, parents)?;
        Ok(parent.remove_child(&receiver_path, last)?.is_some())
    }

    /// Push onto the sequence at `rel`, creating it if absent.
    pub(crate) fn push(&mut self, root: &Path, rel: &[String], value: Value) -> Result<()> {
        let receiver = probe(self.current.as_ref(), root, rel)?;
        let receiver_path = join(root, rel)?;
        match receiver {
            Some(Value::Array(_)) | Some(Value::Null) | None => {}
            Some(other) => return Err(wrong_type(receiver_path, "Array", other)),
        }

        let node = self.current.get_or_insert(Value::Null);
        let target = node.descend_or_create(root, rel)?;
        target.push(&receiver_path, value)
    }

    /// Overwrite (`Some`) or remove (`None`) the value at `rel`.
    pub(crate) fn replace(&mut self, root: &Path, rel: &[String], value: Option<Value>) -> Result<()> {
        match value {
            Some(value) => self.set(root, rel, value),
            None => self.remove(root, rel).map(|_| ()),
        }
    }

    /// Value the shadow will commit, if it exists.
    pub(crate) fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Inferred deltas: every difference between original and current.
    pub(crate) fn deltas(&self, root: &Path, out: &mut Vec<Delta>) {
        diff(root, self.original.as_ref(), self.current.as_ref(), out);
    }
}

/// Check a write at `path` could create its parents in `root`.
///
/// Every ancestor must be a container, null or absent: a shadow never
/// hangs below a scalar.
pub(crate) fn check_reachable(root: &Value, path: &Path) -> Result<()> {
    let Some((_, parents)) = path.segments().split_last() else {
        return Ok(());
    };
    match probe(Some(root), &Path::root(), parents)? {
        None | Some(Value::Null) | Some(Value::Object(_)) | Some(Value::Array(_)) => Ok(()),
        Some(other) => Err(wrong_type(Path::from_segments(parents.iter().cloned())?, "Object", other)),
    }
}

/// Walk `segments` read-only, failing where a write would fail.
///
/// Returns the node at the end of the walk, or `None` once the walk leaves
/// the existing tree (the remainder will be created as objects).
fn probe<'a>(root: Option<&'a Value>, base: &Path, segments: &[String]) -> Result<Option<&'a Value>> {
    let mut node = root;
    for (depth, segment) in segments.iter().enumerate() {
        node = match node {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(map)) => map.get(segment.as_str()),
            Some(Value::Array(items)) => {
                let at = join(base, &segments[..depth])?;
                let index = parse_index(&at, segment)?;
                match items.get(index) {
                    Some(item) => Some(item),
                    None => {
                        return Err(Error::NotFound {
                            path: at.child(segment.as_str())?,
                        })
                    }
                }
            }
            Some(other) => return Err(wrong_type(join(base, &segments[..depth])?, "Object", other)),
        };
    }
    Ok(node)
}

fn check_index(at: &Path, segment: &str, len: usize) -> Result<()> {
    let index = parse_index(at, segment)?;
    if index >= len {
        return Err(Error::NotFound {
            path: at.child(segment)?,
        });
    }
    Ok(())
}

fn parse_index(at: &Path, segment: &str) -> Result<usize> {
    segment.parse::<usize>().map_err(|_| Error::WrongType {
        path: at.clone(),
        expected: "Object",
        actual: "Array",
    })
}

fn join(base: &Path, segments: &[String]) -> Result<Path> {
    Ok(base.join(&Path::from_segments(segments.iter().cloned())?))
}

fn wrong_type(path: Path, expected: &'static str, actual: &Value) -> Error {
    Error::WrongType {
        path,
        expected,
        actual: actual.type_name(),
    }
}
