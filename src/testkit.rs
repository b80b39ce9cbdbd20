//! Test support: a scripted in-memory driver.
//!
//! [`StubDriver`] records every statement it receives and replays queued
//! record streams, so the working set can be exercised without a live
//! back-end. An optional handler intercepts statements before the queue is
//! consulted; [`StubDriver::install_sequence`] uses it to emulate the
//! counter node behind sequence id providers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::{
    Driver, DriverSession, DriverTransaction, Record, RecordStream, RecordValue, Statement,
    WireNode, WireRelationship,
};
use crate::error::{GraphError, Result};
use crate::model::Value;

type Handler = Box<dyn Fn(&Statement) -> Option<Vec<Record>> + Send + Sync>;

#[derive(Default)]
struct StubState {
    statements: Mutex<Vec<Statement>>,
    responses: Mutex<VecDeque<Vec<Record>>>,
    handler: Mutex<Option<Handler>>,
    fail_next: Mutex<Option<String>>,
}

impl StubState {
    fn run(&self, statement: Statement) -> Result<RecordStream> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(GraphError::transport(message));
        }
        let records = {
            let handled = self.handler.lock().as_ref().and_then(|h| h(&statement));
            match handled {
                Some(records) => records,
                None => self.responses.lock().pop_front().unwrap_or_default(),
            }
        };
        self.statements.lock().push(statement);
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

/// In-memory scripted driver for tests.
#[derive(Default, Clone)]
pub struct StubDriver {
    state: Arc<StubState>,
}

impl StubDriver {
    /// Creates a driver with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the response for the next unhandled statement.
    pub fn enqueue(&self, records: Vec<Record>) {
        self.state.responses.lock().push_back(records);
    }

    /// Makes the next `run` call fail with a transport error.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.state.fail_next.lock() = Some(message.into());
    }

    /// Emulates the sequence counter node, starting at `start`.
    ///
    /// Allocation statements atomically advance the counter by their
    /// `poolSize` parameter and return the new top, exactly like the MERGE
    /// the provider emits.
    pub fn install_sequence(&self, start: i64) {
        let counter = Arc::new(AtomicI64::new(start));
        let handler: Handler = Box::new(move |statement: &Statement| {
            if !statement.text.contains("g.nextId") {
                return None;
            }
            let pool = match statement.parameters.get("poolSize") {
                Some(Value::Int(pool)) => *pool,
                _ => return None,
            };
            let top = counter.fetch_add(pool, Ordering::SeqCst) + pool;
            Some(vec![int_record(top)])
        });
        *self.state.handler.lock() = Some(handler);
    }

    /// Every statement run so far, in execution order.
    pub fn statements(&self) -> Vec<Statement> {
        self.state.statements.lock().clone()
    }

    /// Drains and returns the recorded statements.
    pub fn take_statements(&self) -> Vec<Statement> {
        std::mem::take(&mut *self.state.statements.lock())
    }
}

impl Driver for StubDriver {
    fn session(&self) -> Result<Box<dyn DriverSession>> {
        Ok(Box::new(StubSession {
            state: self.state.clone(),
        }))
    }
}

struct StubSession {
    state: Arc<StubState>,
}

impl DriverSession for StubSession {
    fn begin_transaction(&mut self) -> Result<Box<dyn DriverTransaction>> {
        Ok(Box::new(StubTransaction {
            state: self.state.clone(),
            open: true,
        }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct StubTransaction {
    state: Arc<StubState>,
    open: bool,
}

impl DriverTransaction for StubTransaction {
    fn run(&mut self, statement: Statement) -> Result<RecordStream> {
        if !self.open {
            return Err(GraphError::TransactionState("transaction is closed"));
        }
        self.state.run(statement)
    }

    fn success(&mut self) -> Result<()> {
        Ok(())
    }

    fn failure(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Builds a wire node.
pub fn node(internal_id: i64, labels: &[&str], properties: &[(&str, Value)]) -> WireNode {
    WireNode {
        id: internal_id,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        properties: property_map(properties),
    }
}

/// Builds a wire relationship.
pub fn relationship(
    internal_id: i64,
    rel_type: &str,
    start_node_id: i64,
    end_node_id: i64,
    properties: &[(&str, Value)],
) -> WireRelationship {
    WireRelationship {
        id: internal_id,
        rel_type: rel_type.to_string(),
        start_node_id,
        end_node_id,
        properties: property_map(properties),
    }
}

fn property_map(properties: &[(&str, Value)]) -> BTreeMap<String, Value> {
    properties
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// A one-column record holding a node.
pub fn node_record(node: WireNode) -> Record {
    Record::new(vec![RecordValue::Node(node)])
}

/// A three-column `(n, r, m)` record.
pub fn edge_record(n: WireNode, r: WireRelationship, m: WireNode) -> Record {
    Record::new(vec![
        RecordValue::Node(n),
        RecordValue::Relationship(r),
        RecordValue::Node(m),
    ])
}

/// A one-column record holding an integer.
pub fn int_record(value: i64) -> Record {
    Record::new(vec![RecordValue::Value(Value::Int(value))])
}
