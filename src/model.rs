//! Data models shared across the working set.
//!
//! This module defines the value and identifier types that flow between the
//! session, the element state machines, and the back-end driver.
//!
//! # Key Types
//!
//! - [`Value`] - Tagged variant over the value types the driver surfaces
//! - [`ElementId`] - Canonical identifier for vertices, edges and properties
//! - [`Direction`] - Edge traversal direction
//! - [`Cardinality`] - Multiplicity of a vertex property key
//!
//! # Examples
//!
//! ```rust
//! use grapnel::model::{ElementId, Value};
//!
//! let name = Value::from("Alice");
//! let age = Value::from(30i64);
//! let id = ElementId::Int(7);
//! assert_eq!(id.to_string(), "7");
//! assert_eq!(Value::from(id), Value::Int(7));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A property or parameter value.
///
/// Stored property values are restricted to the scalar variants (`Bool`,
/// `Int`, `Float`, `String`); multi-valued vertex properties are expressed
/// through [`Cardinality`], not through `List` values. The `List` and `Map`
/// variants exist for statement parameters and rows streamed back by the
/// driver. Map-typed stored properties are not supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value (true/false)
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered sequence of values
    List(Vec<Value>),
    /// String-keyed map; parameter maps only
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// True for the variants a stored element property may hold.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ElementId> for Value {
    fn from(id: ElementId) -> Self {
        match id {
            ElementId::Int(i) => Value::Int(i),
            ElementId::Text(s) => Value::String(s),
        }
    }
}

impl From<&ElementId> for Value {
    fn from(id: &ElementId) -> Self {
        Value::from(id.clone())
    }
}

/// Canonical element identifier.
///
/// Produced by an id provider, either generated from a pooled sequence or
/// canonicalized from a raw driver value. Immutable once assigned to an
/// element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementId {
    /// Numeric identifier, the form sequence providers allocate.
    Int(i64),
    /// Opaque textual identifier assigned by the back-end.
    Text(String),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Int(i) => write!(f, "{}", i),
            ElementId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        ElementId::Int(value)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId::Text(value.to_string())
    }
}

/// Direction of edges relative to an anchor vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges leaving the anchor.
    Out,
    /// Edges arriving at the anchor.
    In,
    /// Both directions.
    Both,
}

/// Multiplicity of a vertex property key.
///
/// `Single` keys hold exactly one value and replace on write. `List` keys
/// append in insertion order. `Set` keys add only values not already present
/// under the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// One value per key; writes replace.
    Single,
    /// Ordered multi-value; writes append.
    List,
    /// Unordered multi-value; writes deduplicate by value.
    Set,
}

/// Joins a vertex label set into its serialized form.
pub fn join_labels(labels: &[String]) -> String {
    labels.join("::")
}

/// Quotes a label or relationship type for inclusion in statement text.
pub(crate) fn cypher_label(label: &str) -> String {
    format!("`{}`", label.replace('`', "``"))
}
