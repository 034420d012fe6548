//! Dot-separated addresses into the state tree
//!
//! A [`Path`] is parsed and validated once; everything downstream works on
//! segments. The first segment names the [`Layer`]; the final segment
//! decides the zone (see the security crate's zone table).
//!
//! ```
//! use warden_core::{Layer, Path};
//!
//! let path: Path = "domain.order.total".parse().unwrap();
//! assert_eq!(path.layer(), Some(Layer::Domain));
//! assert_eq!(path.last(), Some("total"));
//! assert!(path.starts_with(&"domain.order".parse().unwrap()));
//! ```

use crate::error::{Error, Result};
use crate::types::Layer;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Parsed path into the state tree.
///
/// Ordering is segment-wise lexicographic, so a path sorts immediately
/// before its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: SmallVec<[String; 4]>,
}

impl Path {
    /// The empty path addressing the tree root.
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a dot-separated path.
    pub fn parse(text: &str) -> Result<Self> {
        text.parse()
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Path::root();
        for segment in segments {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    /// Build from segments that were already validated (sub-slices of a path).
    pub(crate) fn from_valid(segments: &[String]) -> Self {
        Path {
            segments: segments.iter().cloned().collect(),
        }
    }

    /// Is this the tree root?
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Path { segments })
    }

    /// Append one segment.
    pub fn child(&self, segment: impl Into<String>) -> Result<Path> {
        let segment = segment.into();
        validate_segment(&segment).map_err(|reason| {
            Error::invalid_path(format!("{}.{}", self, segment), reason)
        })?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Path { segments })
    }

    /// Append every segment of `other`.
    pub fn join(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path { segments }
    }

    /// Segment-wise prefix test (a path starts with itself).
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.segments.len() <= self.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Strict ancestor test.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.segments.len() < other.segments.len() && other.starts_with(self)
    }

    /// True when one path is a prefix of the other.
    ///
    /// Two writes conflict exactly when their paths overlap.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// The remainder of this path below `prefix`.
    pub fn relative_to(&self, prefix: &Path) -> Option<Path> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Path {
            segments: self.segments[prefix.segments.len()..].iter().cloned().collect(),
        })
    }

    /// All ancestors from the root down to (and including) this path.
    pub fn ancestors_and_self(&self) -> impl Iterator<Item = Path> + '_ {
        (0..=self.segments.len()).map(move |n| Path {
            segments: self.segments[..n].iter().cloned().collect(),
        })
    }

    /// Layer named by the first segment, if recognised.
    pub fn layer(&self) -> Option<Layer> {
        self.segments.first().and_then(|s| s.parse().ok())
    }
}

fn validate_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if segment.contains('.') {
        return Err("segment contains '.'");
    }
    if segment.trim().is_empty() || segment.trim() != segment {
        return Err("segment has surrounding whitespace");
    }
    Ok(())
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid_path(text, "empty path"));
        }
        let mut segments = SmallVec::new();
        for segment in text.split('.') {
            validate_segment(segment).map_err(|reason| Error::invalid_path(text, reason))?;
            segments.push(segment.to_string());
        }
        Ok(Path { segments })
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl TryFrom<&str> for Path {
    type Error = Error;

    fn try_from(text: &str) -> Result<Self> {
        text.parse()
    }
}

impl From<Path> for String {
    fn from(path: Path) -> String {
        path.to_string()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments.join("."))
    }
}
