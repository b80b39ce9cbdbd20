//! Back-end driver interface.
//!
//! The working set never speaks the wire protocol itself; it hands
//! parameterized statements to a [`Driver`] implementation and consumes the
//! record streams that come back. The traits here are object safe so a
//! session can hold its driver handles as boxed trait objects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::Value;

/// A parameterized query statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Query text, opaque to the driver.
    pub text: String,
    /// Named parameters referenced from the text.
    pub parameters: BTreeMap<String, Value>,
}

impl Statement {
    /// Creates a statement with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a named parameter.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.parameters).map_err(|_| fmt::Error)?;
        write!(f, "{} {}", self.text, params)
    }
}

/// A node as materialized by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    /// Back-end internal node id.
    pub id: i64,
    /// Labels attached to the node, in server order.
    pub labels: Vec<String>,
    /// Stored properties.
    pub properties: BTreeMap<String, Value>,
}

impl WireNode {
    /// Property value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property keys present on the node.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// A relationship as materialized by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRelationship {
    /// Back-end internal relationship id.
    pub id: i64,
    /// Relationship type.
    pub rel_type: String,
    /// Back-end internal id of the start node.
    pub start_node_id: i64,
    /// Back-end internal id of the end node.
    pub end_node_id: i64,
    /// Stored properties.
    pub properties: BTreeMap<String, Value>,
}

impl WireRelationship {
    /// Property value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property keys present on the relationship.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

/// One positional value inside a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A plain value.
    Value(Value),
    /// A node row entry.
    Node(WireNode),
    /// A relationship row entry.
    Relationship(WireRelationship),
}

impl RecordValue {
    /// The entry as a signed integer.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            RecordValue::Value(Value::Int(i)) => Ok(*i),
            other => Err(GraphError::transport(format!(
                "record value is not an integer: {:?}",
                other
            ))),
        }
    }

    /// The entry as a plain value.
    pub fn as_value(&self) -> Result<&Value> {
        match self {
            RecordValue::Value(value) => Ok(value),
            other => Err(GraphError::transport(format!(
                "record value is not a plain value: {:?}",
                other
            ))),
        }
    }

    /// The entry as a list of values.
    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            RecordValue::Value(Value::List(items)) => Ok(items),
            other => Err(GraphError::transport(format!(
                "record value is not a list: {:?}",
                other
            ))),
        }
    }

    /// The entry as a node.
    pub fn as_node(&self) -> Result<&WireNode> {
        match self {
            RecordValue::Node(node) => Ok(node),
            other => Err(GraphError::transport(format!(
                "record value is not a node: {:?}",
                other
            ))),
        }
    }

    /// The entry as a relationship.
    pub fn as_relationship(&self) -> Result<&WireRelationship> {
        match self {
            RecordValue::Relationship(rel) => Ok(rel),
            other => Err(GraphError::transport(format!(
                "record value is not a relationship: {:?}",
                other
            ))),
        }
    }
}

/// One row of a result stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<RecordValue>,
}

impl Record {
    /// Builds a record from positional values.
    pub fn new(values: Vec<RecordValue>) -> Self {
        Self { values }
    }

    /// Positional access; out-of-range is a transport error.
    pub fn get(&self, index: usize) -> Result<&RecordValue> {
        self.values.get(index).ok_or_else(|| {
            GraphError::transport(format!("record has no value at position {}", index))
        })
    }

    /// Number of values in the record.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the record carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A finite, single-pass stream of records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Entry point to a back-end; hands out independent driver sessions.
pub trait Driver: Send + Sync {
    /// Opens a new driver-level session.
    fn session(&self) -> Result<Box<dyn DriverSession>>;
}

/// A driver-level session, owning at most one open transaction at a time.
pub trait DriverSession: Send {
    /// Begins an explicit transaction.
    fn begin_transaction(&mut self) -> Result<Box<dyn DriverTransaction>>;

    /// Releases the session.
    fn close(&mut self) -> Result<()>;
}

/// An explicit driver transaction.
///
/// The outcome is decided by `success`/`failure` and applied on `close`,
/// mirroring the commit protocol of explicit-transaction wire drivers.
pub trait DriverTransaction: Send {
    /// Executes one statement, returning its record stream.
    fn run(&mut self, statement: Statement) -> Result<RecordStream>;

    /// Marks the transaction to commit on close.
    fn success(&mut self) -> Result<()>;

    /// Marks the transaction to roll back on close.
    fn failure(&mut self) -> Result<()>;

    /// Applies the marked outcome and releases the transaction.
    fn close(&mut self) -> Result<()>;

    /// True while the transaction has not been closed.
    fn is_open(&self) -> bool;
}
