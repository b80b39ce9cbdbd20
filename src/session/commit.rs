//! Commit and rollback orchestration.

use tracing::{debug, warn};

use crate::driver::Statement;
use crate::element::Vertex;
use crate::error::{GraphError, Result};
use crate::model::ElementId;
use crate::session::Session;

impl Session {
    fn endpoint(&self, id: &ElementId) -> Result<&Vertex> {
        self.vertices
            .get(id)
            .or_else(|| self.deleted_vertices.get(id))
            .ok_or_else(|| {
                GraphError::consistency(format!("edge endpoint {} missing from session", id))
            })
    }

    fn live_endpoint(&self, id: &ElementId) -> Result<&Vertex> {
        self.vertices.get(id).ok_or_else(|| {
            GraphError::consistency(format!("edge endpoint {} missing at edge insert", id))
        })
    }

    /// The ordered statement batch persisting the staged state.
    ///
    /// Deletes go first (edges before their vertices), then creates
    /// (vertices before edges that need them), then updates. Edge updates
    /// precede vertex updates so relationship matches still see the
    /// pre-update vertex labels.
    fn commit_statements(&self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        for edge in self.deleted_edges.values() {
            let out = self.endpoint(edge.out_id())?;
            let in_ = self.endpoint(edge.in_id())?;
            statements.push(edge.delete_statement(out, in_, &self.id_field));
        }
        for vertex in self.deleted_vertices.values() {
            statements.push(vertex.delete_statement(&self.id_field));
        }
        for id in &self.transient_vertices {
            let vertex = self.vertices.get(id).ok_or_else(|| {
                GraphError::consistency(format!("transient vertex {} missing from registry", id))
            })?;
            statements.push(vertex.insert_statement(&self.id_field));
        }
        for id in &self.transient_edges {
            let edge = self.edges.get(id).ok_or_else(|| {
                GraphError::consistency(format!("transient edge {} missing from registry", id))
            })?;
            let out = self.live_endpoint(edge.out_id())?;
            let in_ = self.live_endpoint(edge.in_id())?;
            statements.push(edge.insert_statement(out, in_, &self.id_field));
        }
        for id in &self.edge_update_queue {
            if let Some(edge) = self.edges.get(id) {
                let out = self.live_endpoint(edge.out_id())?;
                let in_ = self.live_endpoint(edge.in_id())?;
                if let Some(statement) = edge.update_statement(out, in_, &self.id_field) {
                    statements.push(statement);
                }
            }
        }
        for id in &self.vertex_update_queue {
            if let Some(vertex) = self.vertices.get(id) {
                if let Some(statement) = vertex.update_statement(&self.id_field) {
                    statements.push(statement);
                }
            }
        }
        Ok(statements)
    }

    /// Persists the staged working set.
    ///
    /// A transport failure leaves the driver transaction marked failed; the
    /// caller must roll back before reusing the session.
    pub fn commit(&mut self) -> Result<()> {
        let statements = self.commit_statements()?;
        for statement in statements {
            debug!(%statement, "commit statement");
            let outcome = (|| {
                let tx = self.read_write()?;
                let stream = tx.run(statement)?;
                for record in stream {
                    record?;
                }
                Ok(())
            })();
            if let Err(err) = outcome {
                if let Some(tx) = self.tx.as_mut() {
                    let _ = tx.failure();
                }
                return Err(err);
            }
        }
        if let Some(tx) = self.tx.as_mut() {
            tx.success()?;
            tx.close()?;
        }
        self.tx = None;
        self.finalize_commit();
        Ok(())
    }

    fn finalize_commit(&mut self) {
        for id in &self.transient_vertices {
            if let Some(vertex) = self.vertices.get_mut(id) {
                vertex.finalize_commit();
            }
        }
        for id in &self.transient_edges {
            if let Some(edge) = self.edges.get_mut(id) {
                edge.finalize_commit();
            }
        }
        for id in &self.vertex_update_queue {
            if let Some(vertex) = self.vertices.get_mut(id) {
                vertex.finalize_commit();
            }
        }
        for id in &self.edge_update_queue {
            if let Some(edge) = self.edges.get_mut(id) {
                edge.finalize_commit();
            }
        }
        self.transient_vertices.clear();
        self.transient_edges.clear();
        self.vertex_update_queue.clear();
        self.edge_update_queue.clear();
        self.deleted_vertices.clear();
        self.deleted_edges.clear();
    }

    /// Discards the staged working set, restoring committed snapshots.
    ///
    /// The driver transaction, if open, is failed and closed first; the
    /// in-memory restoration runs regardless so the session stays usable.
    pub fn rollback(&mut self) -> Result<()> {
        let mut driver_result = Ok(());
        if let Some(tx) = self.tx.as_mut() {
            if let Err(err) = tx.failure() {
                warn!(error = %err, "failed to mark driver transaction for rollback");
            }
            driver_result = tx.close();
        }
        self.tx = None;

        let reset_vertices =
            !self.vertex_update_queue.is_empty() || !self.deleted_vertices.is_empty();
        let reset_edges = !self.edge_update_queue.is_empty() || !self.deleted_edges.is_empty();

        // Discard transients.
        for id in std::mem::take(&mut self.transient_vertices) {
            self.vertices.remove(&id);
        }
        for id in std::mem::take(&mut self.transient_edges) {
            self.edges.remove(&id);
        }

        // Restore dirty elements to their committed snapshots.
        for id in std::mem::take(&mut self.vertex_update_queue) {
            if let Some(vertex) = self.vertices.get_mut(&id) {
                vertex.restore();
            }
        }
        for id in std::mem::take(&mut self.edge_update_queue) {
            if let Some(edge) = self.edges.get_mut(&id) {
                edge.restore();
            }
        }

        // Resurrect deleted elements, vertices before the edges that
        // reference them.
        for (id, mut vertex) in std::mem::take(&mut self.deleted_vertices) {
            vertex.restore();
            self.vertices.insert(id, vertex);
        }
        for (id, mut edge) in std::mem::take(&mut self.deleted_edges) {
            edge.restore();
            self.edges.insert(id, edge);
        }

        // Rebuild adjacency from the surviving edge registry so implicit
        // detachments are fully undone.
        for vertex in self.vertices.values_mut() {
            vertex.out_edges.clear();
            vertex.in_edges.clear();
        }
        let links: Vec<(ElementId, ElementId, ElementId)> = self
            .edges
            .iter()
            .map(|(id, edge)| (id.clone(), edge.out_id().clone(), edge.in_id().clone()))
            .collect();
        for (edge_id, out_id, in_id) in links {
            if let Some(vertex) = self.vertices.get_mut(&out_id) {
                vertex.out_edges.insert(edge_id.clone());
            }
            if let Some(vertex) = self.vertices.get_mut(&in_id) {
                vertex.in_edges.insert(edge_id);
            }
        }

        if reset_vertices {
            self.vertices_loaded = false;
        }
        if reset_edges {
            self.edges_loaded = false;
        }
        driver_result
    }
}
