//! # Grapnel - Property-Graph Client with a Transactional Working Set
//!
//! Grapnel layers a transactional, in-memory working set over a remote
//! graph database reachable through a query protocol. Mutations stage
//! inside a per-caller [`Session`]; reads blend in-memory state with rows
//! streamed from the back-end; commit persists the staged state as a
//! minimal, ordered batch of parameterized statements.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use grapnel::{Config, Graph, Value};
//! use grapnel::testkit::StubDriver;
//!
//! // Any back-end exposing the driver traits works; the stub driver
//! // stands in for a real wire driver here.
//! let driver = Arc::new(StubDriver::new());
//! driver.install_sequence(0);
//!
//! let graph = Graph::new(driver, Config::default());
//! let mut session = graph.session()?;
//!
//! let alice = session.add_vertex(&["Person"], &[("name", Value::from("Alice"))])?;
//! let bob = session.add_vertex(&["Person"], &[("name", Value::from("Bob"))])?;
//! session.add_edge("KNOWS", &alice, &bob, &[("since", Value::Int(2020))])?;
//!
//! session.commit()?;
//! session.close()?;
//! # Ok::<(), grapnel::GraphError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Driver layer**: object-safe traits over the wire protocol; the
//!   library only ever emits parameterized statements and consumes record
//!   streams.
//! - **Element layer**: vertex/edge/property state machines tracking
//!   transient, dirty and deleted states with rollback snapshots.
//! - **Session layer**: the per-caller working set holding the registries
//!   and queues, read blending, commit ordering and rollback restoration.
//! - **Facade layer**: the shared [`Graph`] entry point and the explicit
//!   [`Transaction`] protocol.
//!
//! Durability is entirely the back-end's: the library owns no persistent
//! state.

pub mod config;
pub mod driver;
pub mod element;
pub mod error;
pub mod graph;
pub mod id;
pub mod logging;
pub mod model;
pub mod partition;
pub mod session;
pub mod testkit;
pub mod transaction;

// Re-export the main public API
pub use crate::config::Config;
pub use crate::driver::{
    Driver, DriverSession, DriverTransaction, Record, RecordStream, RecordValue, Statement,
    WireNode, WireRelationship,
};
pub use crate::element::{Edge, Vertex, VertexProperty};
pub use crate::error::{GraphError, Result};
pub use crate::graph::Graph;
pub use crate::id::{IdProvider, NativeIdProvider, SequenceIdProvider};
pub use crate::model::{Cardinality, Direction, ElementId, Value};
pub use crate::partition::ReadPartition;
pub use crate::session::Session;
pub use crate::transaction::Transaction;
