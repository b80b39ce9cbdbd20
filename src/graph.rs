//! The graph facade.
//!
//! A [`Graph`] is the shared, immutable entry point: it holds the driver,
//! the read partition and the id providers, and hands out independent
//! [`Session`] working sets. The graph does not own a session's lifetime;
//! the caller does, and must close it.
//!
//! Besides the session factory, the facade carries the graph-level entry
//! points of the user-facing API: one-shot `add_vertex`/`add_edge`/
//! `vertices`/`edges`/`execute` operations that each run inside their own
//! short-lived, auto-committed session, `tx` for an explicit transaction
//! scope, and the `create_index` passthrough. Callers batching several
//! mutations into one transaction work through [`Graph::session`] (or
//! [`Graph::tx`]) instead.

use std::sync::Arc;

use crate::config::Config;
use crate::driver::{Driver, Record, Statement};
use crate::element::{Edge, Vertex};
use crate::error::{GraphError, Result};
use crate::id::{IdProvider, SequenceIdProvider};
use crate::model::{cypher_label, ElementId, Value};
use crate::partition::ReadPartition;
use crate::session::Session;

/// Shared entry point to a property graph behind a driver.
pub struct Graph {
    driver: Arc<dyn Driver>,
    config: Config,
    vertex_ids: Arc<dyn IdProvider>,
    edge_ids: Arc<dyn IdProvider>,
    property_ids: Arc<dyn IdProvider>,
}

impl Graph {
    /// Creates a graph with sequence-pooled id providers drawing from a
    /// single counter node named by the configuration.
    pub fn new(driver: Arc<dyn Driver>, config: Config) -> Self {
        let provider: Arc<dyn IdProvider> = Arc::new(SequenceIdProvider::new(
            driver.clone(),
            config.id_field.clone(),
            config.sequence_label.clone(),
            config.pool_size,
        ));
        Self {
            driver,
            config,
            vertex_ids: provider.clone(),
            edge_ids: provider.clone(),
            property_ids: provider,
        }
    }

    /// Creates a graph with caller-supplied id providers.
    pub fn with_providers(
        driver: Arc<dyn Driver>,
        config: Config,
        vertex_ids: Arc<dyn IdProvider>,
        edge_ids: Arc<dyn IdProvider>,
        property_ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            driver,
            config,
            vertex_ids,
            edge_ids,
            property_ids,
        }
    }

    /// The read partition every session of this graph observes.
    pub fn partition(&self) -> &ReadPartition {
        &self.config.partition
    }

    /// Opens an independent per-caller session.
    pub fn session(&self) -> Result<Session> {
        let driver_session = self.driver.session()?;
        Ok(Session::new(
            driver_session,
            self.config.partition.clone(),
            self.config.id_field.clone(),
            self.vertex_ids.clone(),
            self.edge_ids.clone(),
            self.property_ids.clone(),
        ))
    }

    /// Opens an explicit transaction scope.
    ///
    /// The returned session has its driver transaction already open; its
    /// [`Session::tx`] handle drives commit and rollback. The caller owns
    /// the session and must close it.
    pub fn tx(&self) -> Result<Session> {
        let mut session = self.session()?;
        session.read_write()?;
        Ok(session)
    }

    /// Runs `f` inside a dedicated session that is closed on every exit
    /// path.
    fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut session = self.session()?;
        match f(&mut session) {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(err) => {
                // Close rolls the failed transaction back; the original
                // error is the one worth reporting.
                let _ = session.close();
                Err(err)
            }
        }
    }

    /// Creates and commits a vertex in one round, returning its committed
    /// snapshot.
    pub fn add_vertex(&self, labels: &[&str], properties: &[(&str, Value)]) -> Result<Vertex> {
        self.with_session(|session| {
            let id = session.add_vertex(labels, properties)?;
            session.commit()?;
            session.vertex(&id).cloned().ok_or_else(|| {
                GraphError::consistency(format!("committed vertex {} missing from session", id))
            })
        })
    }

    /// Creates and commits an edge between two persisted vertices in one
    /// round, returning its committed snapshot.
    pub fn add_edge(
        &self,
        label: &str,
        out: &ElementId,
        in_: &ElementId,
        properties: &[(&str, Value)],
    ) -> Result<Edge> {
        self.with_session(|session| {
            session.vertices(&[Value::from(out), Value::from(in_)])?;
            let id = session.add_edge(label, out, in_, properties)?;
            session.commit()?;
            session.edge(&id).cloned().ok_or_else(|| {
                GraphError::consistency(format!("committed edge {} missing from session", id))
            })
        })
    }

    /// Vertices by id as committed snapshots; an empty id list yields every
    /// visible vertex.
    pub fn vertices(&self, ids: &[Value]) -> Result<Vec<Vertex>> {
        self.with_session(|session| {
            let found = session.vertices(ids)?;
            Ok(found
                .iter()
                .filter_map(|id| session.vertex(id).cloned())
                .collect())
        })
    }

    /// Edges by id as committed snapshots; an empty id list yields every
    /// visible edge.
    pub fn edges(&self, ids: &[Value]) -> Result<Vec<Edge>> {
        self.with_session(|session| {
            let found = session.edges(ids)?;
            Ok(found
                .iter()
                .filter_map(|id| session.edge(id).cloned())
                .collect())
        })
    }

    /// Runs an arbitrary statement in its own transaction and returns the
    /// raw records.
    pub fn execute(&self, statement: Statement) -> Result<Vec<Record>> {
        self.with_session(|session| {
            let records = session.execute(statement)?;
            session.commit()?;
            Ok(records)
        })
    }

    /// Creates a back-end index on `:label(property)`.
    pub fn create_index(&self, label: &str, property: &str) -> Result<()> {
        let statement = Statement::new(format!(
            "CREATE INDEX ON :{}({})",
            cypher_label(label),
            property
        ));
        self.execute(statement).map(|_| ())
    }
}
