//! Value types for the state tree
//!
//! This module defines the canonical [`Value`] stored at every node of the
//! state tree.
//!
//! ## Structural Sharing
//!
//! Containers (`Array`, `Object`) hold their children behind [`Arc`]. Cloning
//! a value is O(1); mutating through the `*_mut` helpers copies only the
//! containers on the path from the mutated node up to the receiver
//! (`Arc::make_mut`). Untouched subtrees stay shared with every other holder,
//! which is what lets the store publish a new root without copying the tree
//! and lets shadows start as free clones of the committed state.
//!
//! ## Equality Rules
//!
//! - Different types are NEVER equal (no type coercion)
//! - `Int(1)` != `Float(1.0)`
//! - `String("abc")` != `Bytes([97, 98, 99])`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//!
//! Change detection uses [`Value::identical`] instead, which compares float
//! bits so a NaN left untouched is not reported as a change.

use crate::error::{Error, Result};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque reference into the bulk-payload zone.
///
/// The engine stores and swaps handles; allocation and release belong to
/// the external payload allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PayloadHandle(pub u64);

impl fmt::Display for PayloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// A node of the state tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence of value
    #[default]
    Null,

    /// Boolean true or false
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Arbitrary binary data, distinct from String
    Bytes(Vec<u8>),

    /// Ordered sequence of values
    Array(Arc<Vec<Value>>),

    /// String-keyed map of values, ordered by key
    Object(Arc<BTreeMap<String, Value>>),

    /// Bulk-payload reference
    Handle(PayloadHandle),
}

impl Value {
    /// Empty object.
    pub fn object() -> Self {
        Value::Object(Arc::new(BTreeMap::new()))
    }

    /// Empty array.
    pub fn array() -> Self {
        Value::Array(Arc::new(Vec::new()))
    }

    /// Object from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(Arc::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Returns the type name as a string (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Handle(_) => "Handle",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Arrays and objects are containers; everything else is a scalar.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view of Int or Float.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes slice
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as array slice
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as object reference
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Try to get as payload handle
    pub fn as_handle(&self) -> Option<PayloadHandle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Length for strings (chars), bytes, arrays and objects.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::Array(a) => Some(a.len()),
            Value::Object(o) => Some(o.len()),
            _ => None,
        }
    }

    /// Direct child by segment. Numeric segments index arrays.
    pub fn child(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Descendant at a relative segment list.
    pub fn get_path(&self, segments: &[String]) -> Option<&Value> {
        let mut node = self;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Navigate to `rel`, turning missing or null nodes into empty objects.
    ///
    /// `base` is only used to name the failing node in errors.
    pub fn descend_or_create(&mut self, base: &Path, rel: &[String]) -> Result<&mut Value> {
        let mut node = self;
        for (depth, segment) in rel.iter().enumerate() {
            if node.is_null() {
                *node = Value::object();
            }
            node = match node {
                Value::Object(map) => Arc::make_mut(map)
                    .entry(segment.clone())
                    .or_insert(Value::Null),
                Value::Array(items) => {
                    let at = base.join(&Path::from_valid(&rel[..=depth]));
                    let index = parse_index(&at, segment)?;
                    Arc::make_mut(items)
                        .get_mut(index)
                        .ok_or(Error::NotFound { path: at })?
                }
                other => {
                    return Err(Error::WrongType {
                        path: base.join(&Path::from_valid(&rel[..depth])),
                        expected: "Object",
                        actual: other.type_name(),
                    })
                }
            };
        }
        Ok(node)
    }

    /// Set a direct child, returning the previous value.
    ///
    /// A null receiver becomes an object. On arrays the segment must index
    /// an existing element.
    pub fn insert_child(&mut self, at: &Path, segment: &str, value: Value) -> Result<Option<Value>> {
        if self.is_null() {
            *self = Value::object();
        }
        match self {
            Value::Object(map) => Ok(Arc::make_mut(map).insert(segment.to_string(), value)),
            Value::Array(items) => {
                let index = parse_index(at, segment)?;
                let items = Arc::make_mut(items);
                match items.get_mut(index) {
                    Some(slot) => Ok(Some(std::mem::replace(slot, value))),
                    None => Err(Error::NotFound {
                        path: at.child(segment)?,
                    }),
                }
            }
            other => Err(Error::WrongType {
                path: at.clone(),
                expected: "Object",
                actual: other.type_name(),
            }),
        }
    }

    /// Remove a direct child, returning it if it existed.
    pub fn remove_child(&mut self, at: &Path, segment: &str) -> Result<Option<Value>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(map) => {
                if !map.contains_key(segment) {
                    return Ok(None);
                }
                Ok(Arc::make_mut(map).remove(segment))
            }
            Value::Array(items) => {
                let index = parse_index(at, segment)?;
                if index >= items.len() {
                    return Ok(None);
                }
                Ok(Some(Arc::make_mut(items).remove(index)))
            }
            other => Err(Error::WrongType {
                path: at.clone(),
                expected: "Object",
                actual: other.type_name(),
            }),
        }
    }

    /// Push onto an array. A null receiver becomes an array.
    pub fn push(&mut self, at: &Path, value: Value) -> Result<()> {
        if self.is_null() {
            *self = Value::array();
        }
        match self {
            Value::Array(items) => {
                Arc::make_mut(items).push(value);
                Ok(())
            }
            other => Err(Error::WrongType {
                path: at.clone(),
                expected: "Array",
                actual: other.type_name(),
            }),
        }
    }

    /// Exact identity used for change detection.
    ///
    /// Shared containers short-circuit on pointer equality; floats compare
    /// by bit pattern.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.identical(y)))
            }
            (Value::Object(a), Value::Object(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb)))
            }
            _ => self == other,
        }
    }

    /// Convert to a JSON value. Handles encode as `{"$handle": n}`, bytes
    /// as an array of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => J::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Handle(h) => {
                let mut obj = serde_json::Map::new();
                obj.insert("$handle".to_string(), J::from(h.0));
                J::Object(obj)
            }
        }
    }
}

fn parse_index(at: &Path, segment: &str) -> Result<usize> {
    segment.parse::<usize>().map_err(|_| Error::WrongType {
        path: at.clone(),
        expected: "Object",
        actual: "Array",
    })
}

// ============================================================================
// Custom PartialEq Implementation (IEEE-754 semantics, no type coercion)
// ============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754 equality: NaN != NaN, but -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,

            // Different types: NEVER equal (NO TYPE COERCION)
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl From<PayloadHandle> for Value {
    fn from(h: PayloadHandle) -> Self {
        Value::Handle(h)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::String(s),
            J::Array(items) => Value::Array(Arc::new(items.into_iter().map(Value::from).collect())),
            J::Object(map) => {
                if map.len() == 1 {
                    if let Some(h) = map.get("$handle").and_then(|h| h.as_u64()) {
                        return Value::Handle(PayloadHandle(h));
                    }
                }
                Value::Object(Arc::new(
                    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
                ))
            }
        }
    }
}
