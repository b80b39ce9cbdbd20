//! The transactional working set.
//!
//! A [`Session`] is the per-caller arena owning every vertex, edge and
//! vertex property materialized or created during its lifetime. Mutations
//! stage in the session's registries and queues; reads blend in-memory
//! state with rows streamed from the back-end; commit turns the staged
//! state into an ordered statement batch, and rollback restores the
//! committed snapshots.
//!
//! A session is not safe for concurrent mutation. Callers needing
//! concurrency obtain independent sessions from the graph facade.

mod commit;
mod reads;
#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::driver::{DriverSession, DriverTransaction};
use crate::element::{Edge, Vertex};
use crate::error::{GraphError, Result};
use crate::id::IdProvider;
use crate::model::{Cardinality, ElementId, Value};
use crate::partition::ReadPartition;
use crate::transaction::Transaction;

/// Per-caller transactional working set over a back-end driver session.
pub struct Session {
    driver_session: Box<dyn DriverSession>,
    pub(crate) tx: Option<Box<dyn DriverTransaction>>,
    pub(crate) partition: ReadPartition,
    pub(crate) id_field: String,
    pub(crate) vertex_ids: Arc<dyn IdProvider>,
    pub(crate) edge_ids: Arc<dyn IdProvider>,
    pub(crate) property_ids: Arc<dyn IdProvider>,
    pub(crate) vertices: FxHashMap<ElementId, Vertex>,
    pub(crate) edges: FxHashMap<ElementId, Edge>,
    pub(crate) deleted_vertices: BTreeMap<ElementId, Vertex>,
    pub(crate) deleted_edges: BTreeMap<ElementId, Edge>,
    pub(crate) transient_vertices: Vec<ElementId>,
    pub(crate) transient_edges: Vec<ElementId>,
    pub(crate) vertex_update_queue: BTreeSet<ElementId>,
    pub(crate) edge_update_queue: BTreeSet<ElementId>,
    pub(crate) vertices_loaded: bool,
    pub(crate) edges_loaded: bool,
    closed: bool,
}

impl Session {
    pub(crate) fn new(
        driver_session: Box<dyn DriverSession>,
        partition: ReadPartition,
        id_field: String,
        vertex_ids: Arc<dyn IdProvider>,
        edge_ids: Arc<dyn IdProvider>,
        property_ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            driver_session,
            tx: None,
            partition,
            id_field,
            vertex_ids,
            edge_ids,
            property_ids,
            vertices: FxHashMap::default(),
            edges: FxHashMap::default(),
            deleted_vertices: BTreeMap::new(),
            deleted_edges: BTreeMap::new(),
            transient_vertices: Vec::new(),
            transient_edges: Vec::new(),
            vertex_update_queue: BTreeSet::new(),
            edge_update_queue: BTreeSet::new(),
            vertices_loaded: false,
            edges_loaded: false,
            closed: false,
        }
    }

    /// The per-caller transaction handle.
    pub fn tx(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Opens the driver transaction if none is open and returns it.
    pub(crate) fn read_write(&mut self) -> Result<&mut Box<dyn DriverTransaction>> {
        if self.closed {
            return Err(GraphError::TransactionState("session is closed"));
        }
        if self.tx.is_none() {
            debug!("opening driver transaction");
            self.tx = Some(self.driver_session.begin_transaction()?);
        }
        self.tx
            .as_mut()
            .ok_or(GraphError::TransactionState("transaction not open"))
    }

    /// Live vertex by id, if present in the working set.
    pub fn vertex(&self, id: &ElementId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Live edge by id, if present in the working set.
    pub fn edge(&self, id: &ElementId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Number of live vertices in the working set.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of live edges in the working set.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn validate_property(&self, key: &str, value: &Value) -> Result<()> {
        if key.is_empty() {
            return Err(GraphError::user_input("property key must not be empty"));
        }
        if key == self.id_field {
            return Err(GraphError::user_input(format!(
                "property key '{}' is reserved for element ids",
                key
            )));
        }
        match value {
            Value::Map(_) => Err(GraphError::UnsupportedFeature(
                "map-typed property values are not supported",
            )),
            v if v.is_scalar() => Ok(()),
            other => Err(GraphError::user_input(format!(
                "value cannot be stored as a property: {:?}",
                other
            ))),
        }
    }

    fn validate_labels(labels: &[&str]) -> Result<Vec<String>> {
        if labels.is_empty() {
            return Err(GraphError::user_input(
                "an element needs at least one label",
            ));
        }
        let mut out: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if label.is_empty() {
                return Err(GraphError::user_input("labels must not be empty"));
            }
            if !out.iter().any(|l| l == label) {
                out.push((*label).to_string());
            }
        }
        Ok(out)
    }

    /// Creates a transient vertex with the given labels and single-cardinality
    /// properties.
    pub fn add_vertex(
        &mut self,
        labels: &[&str],
        properties: &[(&str, Value)],
    ) -> Result<ElementId> {
        self.read_write()?;
        let labels = Self::validate_labels(labels)?;
        for (key, value) in properties {
            self.validate_property(key, value)?;
        }
        let id = self.vertex_ids.generate()?;
        if self.vertices.contains_key(&id) || self.deleted_vertices.contains_key(&id) {
            return Err(GraphError::consistency(format!(
                "vertex id collision on create: {}",
                id
            )));
        }
        let mut vertex = Vertex::transient(id.clone(), labels);
        for (key, value) in properties {
            let property_id = self.property_ids.generate()?;
            vertex.set_property(Cardinality::Single, key, value.clone(), property_id)?;
        }
        self.vertices.insert(id.clone(), vertex);
        self.transient_vertices.push(id.clone());
        Ok(id)
    }

    /// Creates a transient edge between two live vertices of this session.
    pub fn add_edge(
        &mut self,
        label: &str,
        out: &ElementId,
        in_: &ElementId,
        properties: &[(&str, Value)],
    ) -> Result<ElementId> {
        self.read_write()?;
        if label.is_empty() {
            return Err(GraphError::user_input("edge label must not be empty"));
        }
        for (key, value) in properties {
            self.validate_property(key, value)?;
        }
        if !self.vertices.contains_key(out) {
            return Err(GraphError::user_input(format!(
                "out vertex {} is not in this session",
                out
            )));
        }
        if !self.vertices.contains_key(in_) {
            return Err(GraphError::user_input(format!(
                "in vertex {} is not in this session",
                in_
            )));
        }
        let id = self.edge_ids.generate()?;
        if self.edges.contains_key(&id) || self.deleted_edges.contains_key(&id) {
            return Err(GraphError::consistency(format!(
                "edge id collision on create: {}",
                id
            )));
        }
        let mut edge = Edge::transient(id.clone(), label, out.clone(), in_.clone());
        for (key, value) in properties {
            edge.set_property(key, value.clone())?;
        }
        self.edges.insert(id.clone(), edge);
        self.transient_edges.push(id.clone());
        if let Some(vertex) = self.vertices.get_mut(out) {
            vertex.out_edges.insert(id.clone());
        }
        if let Some(vertex) = self.vertices.get_mut(in_) {
            vertex.in_edges.insert(id.clone());
        }
        Ok(id)
    }

    /// Removes an edge, detaching it from both endpoints.
    ///
    /// A transient edge is discarded outright; a persisted edge is queued
    /// for deletion at commit.
    pub fn remove_edge(&mut self, id: &ElementId) -> Result<()> {
        self.read_write()?;
        let edge = self
            .edges
            .remove(id)
            .ok_or_else(|| GraphError::user_input(format!("edge {} is not in this session", id)))?;
        self.detach_edge(id, edge.out_id().clone(), edge.in_id().clone());
        self.edge_update_queue.remove(id);
        if edge.is_transient() {
            self.transient_edges.retain(|e| e != id);
        } else {
            self.deleted_edges.insert(id.clone(), edge);
        }
        Ok(())
    }

    fn detach_edge(&mut self, id: &ElementId, out_id: ElementId, in_id: ElementId) {
        if let Some(vertex) = self.vertices.get_mut(&out_id) {
            vertex.out_edges.remove(id);
        } else if let Some(vertex) = self.deleted_vertices.get_mut(&out_id) {
            vertex.out_edges.remove(id);
        }
        if let Some(vertex) = self.vertices.get_mut(&in_id) {
            vertex.in_edges.remove(id);
        } else if let Some(vertex) = self.deleted_vertices.get_mut(&in_id) {
            vertex.in_edges.remove(id);
        }
    }

    /// Removes a vertex together with all locally known incident edges.
    ///
    /// Incident edges the session never loaded are covered server-side by
    /// the detaching delete statement.
    pub fn remove_vertex(&mut self, id: &ElementId) -> Result<()> {
        self.read_write()?;
        let incident: Vec<ElementId> = {
            let vertex = self.vertices.get(id).ok_or_else(|| {
                GraphError::user_input(format!("vertex {} is not in this session", id))
            })?;
            vertex
                .out_edges
                .iter()
                .chain(vertex.in_edges.iter())
                .cloned()
                .collect()
        };
        for edge_id in incident {
            // Both directions were collected; a self-loop shows up twice.
            if self.edges.contains_key(&edge_id) {
                self.remove_edge(&edge_id)?;
            }
        }
        let vertex = match self.vertices.remove(id) {
            Some(vertex) => vertex,
            None => return Ok(()),
        };
        self.vertex_update_queue.remove(id);
        if vertex.is_transient() {
            self.transient_vertices.retain(|v| v != id);
        } else {
            self.deleted_vertices.insert(id.clone(), vertex);
        }
        Ok(())
    }

    /// Adds a label to a vertex, subject to partition validation.
    pub fn add_label(&mut self, id: &ElementId, label: &str) -> Result<()> {
        self.read_write()?;
        if label.is_empty() {
            return Err(GraphError::user_input("labels must not be empty"));
        }
        if !self.partition.validate_label(label) {
            return Err(GraphError::user_input(format!(
                "label '{}' is reserved by the read partition",
                label
            )));
        }
        let vertex = self.vertices.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("vertex {} is not in this session", id))
        })?;
        let transient = vertex.is_transient();
        if vertex.add_label(label) && !transient {
            self.vertex_update_queue.insert(id.clone());
        }
        Ok(())
    }

    /// Removes a label from a vertex, subject to partition validation.
    pub fn remove_label(&mut self, id: &ElementId, label: &str) -> Result<()> {
        self.read_write()?;
        if !self.partition.validate_label(label) {
            return Err(GraphError::user_input(format!(
                "label '{}' is reserved by the read partition",
                label
            )));
        }
        let vertex = self.vertices.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("vertex {} is not in this session", id))
        })?;
        let transient = vertex.is_transient();
        if vertex.remove_label(label) && !transient {
            self.vertex_update_queue.insert(id.clone());
        }
        Ok(())
    }

    /// Stores a vertex property value; returns the allocated property id.
    pub fn set_vertex_property(
        &mut self,
        id: &ElementId,
        cardinality: Cardinality,
        key: &str,
        value: Value,
    ) -> Result<ElementId> {
        self.read_write()?;
        self.validate_property(key, &value)?;
        if !self.vertices.contains_key(id) {
            return Err(GraphError::user_input(format!(
                "vertex {} is not in this session",
                id
            )));
        }
        let property_id = self.property_ids.generate()?;
        let vertex = self.vertices.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("vertex {} is not in this session", id))
        })?;
        let transient = vertex.is_transient();
        let changed = vertex.set_property(cardinality, key, value, property_id.clone())?;
        if changed && !transient {
            self.vertex_update_queue.insert(id.clone());
        }
        Ok(property_id)
    }

    /// Drops every value stored under `key` on a vertex.
    pub fn remove_vertex_property(&mut self, id: &ElementId, key: &str) -> Result<bool> {
        self.read_write()?;
        let vertex = self.vertices.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("vertex {} is not in this session", id))
        })?;
        let transient = vertex.is_transient();
        let existed = vertex.remove_property(key);
        if existed && !transient {
            self.vertex_update_queue.insert(id.clone());
        }
        Ok(existed)
    }

    /// Stores an edge property value, replacing any previous value.
    pub fn set_edge_property(&mut self, id: &ElementId, key: &str, value: Value) -> Result<()> {
        self.read_write()?;
        self.validate_property(key, &value)?;
        let edge = self.edges.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("edge {} is not in this session", id))
        })?;
        let transient = edge.is_transient();
        edge.set_property(key, value)?;
        if !transient {
            self.edge_update_queue.insert(id.clone());
        }
        Ok(())
    }

    /// Drops `key` from an edge.
    pub fn remove_edge_property(&mut self, id: &ElementId, key: &str) -> Result<bool> {
        self.read_write()?;
        let edge = self.edges.get_mut(id).ok_or_else(|| {
            GraphError::user_input(format!("edge {} is not in this session", id))
        })?;
        let transient = edge.is_transient();
        let existed = edge.remove_property(key);
        if existed && !transient {
            self.edge_update_queue.insert(id.clone());
        }
        Ok(existed)
    }

    /// Closes the session, rolling back any open transaction.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let rollback_result = if self.tx.is_some() {
            self.rollback()
        } else {
            Ok(())
        };
        let close_result = self.driver_session.close();
        self.closed = true;
        rollback_result.and(close_result)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            error!("session dropped without close; rolling back");
            if let Some(tx) = self.tx.as_mut() {
                let _ = tx.failure();
                let _ = tx.close();
            }
            self.tx = None;
            let _ = self.driver_session.close();
        }
    }
}
