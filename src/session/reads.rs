//! Read paths: the query-to-stream bridge.
//!
//! Every read returns the correct view of the working set without loading
//! the whole graph: rows streamed from the back-end filtered for deleted
//! elements, plus transient elements, minus duplicates. The in-memory
//! contribution is snapshotted before remote rows are blended in.

use std::collections::BTreeMap;

use tracing::debug;

use crate::driver::{Record, RecordStream, Statement, WireNode, WireRelationship};
use crate::element::{Edge, Vertex, VertexProperty};
use crate::error::{GraphError, Result};
use crate::model::{cypher_label, Cardinality, Direction, ElementId, Value};
use crate::session::Session;

impl Session {
    fn run(&mut self, statement: Statement) -> Result<RecordStream> {
        debug!(%statement, "running statement");
        self.read_write()?.run(statement)
    }

    /// Materializes a vertex row into the working set.
    ///
    /// Returns the id of the live vertex, or `None` when the row must not
    /// surface: the vertex was deleted this transaction or lies outside the
    /// read partition. A row for an already-resident vertex yields the
    /// resident instance; local modifications win over the stream.
    pub(crate) fn load_vertex(&mut self, node: &WireNode) -> Result<Option<ElementId>> {
        let raw = node.get(&self.id_field).ok_or_else(|| {
            GraphError::consistency(format!("vertex row lacks id field '{}'", self.id_field))
        })?;
        let id = self.vertex_ids.canonicalize(raw)?;
        if self.deleted_vertices.contains_key(&id) {
            return Ok(None);
        }
        if self.vertices.contains_key(&id) {
            return Ok(Some(id));
        }
        if !self.partition.contains_vertex(&node.labels) {
            return Ok(None);
        }
        let mut properties: BTreeMap<String, Vec<VertexProperty>> = BTreeMap::new();
        let mut cardinalities: BTreeMap<String, Cardinality> = BTreeMap::new();
        for (key, value) in &node.properties {
            if key == &self.id_field {
                continue;
            }
            match value {
                Value::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        let property_id = self.property_ids.generate()?;
                        values.push(VertexProperty::new(property_id, key, item.clone()));
                    }
                    properties.insert(key.clone(), values);
                    cardinalities.insert(key.clone(), Cardinality::List);
                }
                other => {
                    let property_id = self.property_ids.generate()?;
                    properties.insert(
                        key.clone(),
                        vec![VertexProperty::new(property_id, key, other.clone())],
                    );
                    cardinalities.insert(key.clone(), Cardinality::Single);
                }
            }
        }
        let vertex = Vertex::persisted(id.clone(), node.labels.clone(), properties, cardinalities);
        self.vertices.insert(id.clone(), vertex);
        Ok(Some(id))
    }

    /// Materializes a `(n, r, m)` row into the working set.
    ///
    /// Endpoints are materialized first; if either endpoint is invisible
    /// (deleted or outside the partition), the edge is invisible too.
    pub(crate) fn load_edge(
        &mut self,
        n: &WireNode,
        r: &WireRelationship,
        m: &WireNode,
    ) -> Result<Option<ElementId>> {
        let raw = r.get(&self.id_field).ok_or_else(|| {
            GraphError::consistency(format!("edge row lacks id field '{}'", self.id_field))
        })?;
        let id = self.edge_ids.canonicalize(raw)?;
        if self.deleted_edges.contains_key(&id) {
            return Ok(None);
        }
        if self.edges.contains_key(&id) {
            return Ok(Some(id));
        }
        let (out_node, in_node) = if r.start_node_id == n.id {
            (n, m)
        } else if r.start_node_id == m.id {
            (m, n)
        } else {
            return Err(GraphError::consistency(
                "relationship endpoints do not match returned nodes".to_string(),
            ));
        };
        let Some(out_id) = self.load_vertex(out_node)? else {
            return Ok(None);
        };
        let Some(in_id) = self.load_vertex(in_node)? else {
            return Ok(None);
        };
        let mut properties = r.properties.clone();
        properties.remove(&self.id_field);
        let edge = Edge::persisted(id.clone(), r.rel_type.clone(), out_id.clone(), in_id.clone(), properties);
        self.edges.insert(id.clone(), edge);
        if let Some(vertex) = self.vertices.get_mut(&out_id) {
            vertex.out_edges.insert(id.clone());
        }
        if let Some(vertex) = self.vertices.get_mut(&in_id) {
            vertex.in_edges.insert(id.clone());
        }
        Ok(Some(id))
    }

    fn all_vertices_statement(&self) -> Statement {
        let pattern = format!("(n{})", self.partition.pattern_fragment());
        match self.partition.match_predicate("n") {
            Some(predicate) => {
                Statement::new(format!("MATCH {} WHERE {} RETURN n", pattern, predicate))
            }
            None => Statement::new(format!("MATCH {} RETURN n", pattern)),
        }
    }

    fn vertices_by_ids_statement(&self, ids: &[ElementId]) -> Statement {
        let pattern = format!("(n{})", self.partition.pattern_fragment());
        let mut text = format!("MATCH {} WHERE n.{} IN $ids", pattern, self.id_field);
        if let Some(predicate) = self.partition.match_predicate("n") {
            text.push_str(&format!(" AND {}", predicate));
        }
        text.push_str(" RETURN n");
        Statement::new(text).parameter(
            "ids",
            Value::List(ids.iter().map(Value::from).collect()),
        )
    }

    fn edges_statement(&self, ids: Option<&[ElementId]>) -> Statement {
        let labels = self.partition.pattern_fragment();
        let mut clauses: Vec<String> = Vec::new();
        if ids.is_some() {
            clauses.push(format!("r.{} IN $ids", self.id_field));
        }
        if let Some(predicate) = self.partition.match_predicate("n") {
            clauses.push(predicate);
        }
        if let Some(predicate) = self.partition.match_predicate("m") {
            clauses.push(predicate);
        }
        let mut text = format!("MATCH (n{})-[r]->(m{})", labels, labels);
        if !clauses.is_empty() {
            text.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
        }
        text.push_str(" RETURN n, r, m");
        let statement = Statement::new(text);
        match ids {
            Some(ids) => statement.parameter(
                "ids",
                Value::List(ids.iter().map(Value::from).collect()),
            ),
            None => statement,
        }
    }

    /// Vertices by id; an empty id list yields every visible vertex.
    ///
    /// Once the full set has been surfaced this transaction, subsequent
    /// calls answer from the registry alone.
    pub fn vertices(&mut self, ids: &[Value]) -> Result<Vec<ElementId>> {
        self.read_write()?;
        if ids.is_empty() {
            if !self.vertices_loaded {
                let statement = self.all_vertices_statement();
                let stream = self.run(statement)?;
                for record in stream {
                    let record = record?;
                    let node = record.get(0)?.as_node()?.clone();
                    self.load_vertex(&node)?;
                }
                self.vertices_loaded = true;
            }
            let mut out: Vec<ElementId> = self.vertices.keys().cloned().collect();
            out.sort();
            return Ok(out);
        }
        let mut canonical: Vec<ElementId> = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = self.vertex_ids.canonicalize(raw)?;
            if !canonical.contains(&id) {
                canonical.push(id);
            }
        }
        if self.vertices_loaded {
            return Ok(canonical
                .into_iter()
                .filter(|id| self.vertices.contains_key(id))
                .collect());
        }
        let mut out: Vec<ElementId> = Vec::new();
        let mut remote: Vec<ElementId> = Vec::new();
        for id in canonical {
            if self.vertices.contains_key(&id) {
                out.push(id);
            } else if !self.deleted_vertices.contains_key(&id) {
                remote.push(id);
            }
        }
        if !remote.is_empty() {
            let statement = self.vertices_by_ids_statement(&remote);
            let stream = self.run(statement)?;
            for record in stream {
                let record = record?;
                let node = record.get(0)?.as_node()?.clone();
                if let Some(id) = self.load_vertex(&node)? {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Edges by id; an empty id list yields every visible edge.
    pub fn edges(&mut self, ids: &[Value]) -> Result<Vec<ElementId>> {
        self.read_write()?;
        if ids.is_empty() {
            if !self.edges_loaded {
                let statement = self.edges_statement(None);
                self.stream_edges(statement)?;
                self.edges_loaded = true;
            }
            let mut out: Vec<ElementId> = self.edges.keys().cloned().collect();
            out.sort();
            return Ok(out);
        }
        let mut canonical: Vec<ElementId> = Vec::with_capacity(ids.len());
        for raw in ids {
            let id = self.edge_ids.canonicalize(raw)?;
            if !canonical.contains(&id) {
                canonical.push(id);
            }
        }
        if self.edges_loaded {
            return Ok(canonical
                .into_iter()
                .filter(|id| self.edges.contains_key(id))
                .collect());
        }
        let mut out: Vec<ElementId> = Vec::new();
        let mut remote: Vec<ElementId> = Vec::new();
        for id in canonical {
            if self.edges.contains_key(&id) {
                out.push(id);
            } else if !self.deleted_edges.contains_key(&id) {
                remote.push(id);
            }
        }
        if !remote.is_empty() {
            let statement = self.edges_statement(Some(&remote));
            let loaded = self.stream_edges(statement)?;
            for id in loaded {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    fn stream_edges(&mut self, statement: Statement) -> Result<Vec<ElementId>> {
        let stream = self.run(statement)?;
        let mut loaded = Vec::new();
        for record in stream {
            let record = record?;
            let n = record.get(0)?.as_node()?.clone();
            let r = record.get(1)?.as_relationship()?.clone();
            let m = record.get(2)?.as_node()?.clone();
            if let Some(id) = self.load_edge(&n, &r, &m)? {
                loaded.push(id);
            }
        }
        Ok(loaded)
    }

    fn relationship_fragment(labels: &[&str]) -> String {
        match labels.len() {
            0 => String::new(),
            1 => format!(":{}", cypher_label(labels[0])),
            _ => {
                let joined: Vec<String> =
                    labels.iter().map(|l| format!(":{}", cypher_label(l))).collect();
                joined.join("|")
            }
        }
    }

    fn traversal_shape(
        &self,
        anchor_pattern: &str,
        direction: Direction,
        labels: &[&str],
    ) -> String {
        let rel = Self::relationship_fragment(labels);
        let far = format!("(m{})", self.partition.pattern_fragment());
        match direction {
            Direction::Out => format!("{}-[r{}]->{}", anchor_pattern, rel, far),
            Direction::In => format!("{}<-[r{}]-{}", anchor_pattern, rel, far),
            Direction::Both => format!("{}-[r{}]-{}", anchor_pattern, rel, far),
        }
    }

    fn direction_loaded(vertex: &Vertex, direction: Direction) -> bool {
        match direction {
            Direction::Out => vertex.out_edges_loaded,
            Direction::In => vertex.in_edges_loaded,
            Direction::Both => vertex.out_edges_loaded && vertex.in_edges_loaded,
        }
    }

    fn incident_ids(vertex: &Vertex, direction: Direction) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            out.extend(vertex.out_edges.iter().cloned());
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for id in &vertex.in_edges {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Incident edges of a vertex, filtered by direction and label set.
    ///
    /// An empty label set matches every incident edge. The adjacency cache
    /// is only marked loaded when the call had no label filter.
    pub fn vertex_edges(
        &mut self,
        id: &ElementId,
        direction: Direction,
        labels: &[&str],
    ) -> Result<Vec<ElementId>> {
        self.read_write()?;
        let (anchor, known, loaded) = {
            let vertex = self.vertices.get(id).ok_or_else(|| {
                GraphError::user_input(format!("vertex {} is not in this session", id))
            })?;
            (
                vertex.match_pattern("n", &self.id_field, "id"),
                Self::incident_ids(vertex, direction),
                Self::direction_loaded(vertex, direction),
            )
        };
        let local: Vec<ElementId> = known
            .iter()
            .filter(|eid| {
                self.edges
                    .get(*eid)
                    .map(|e| labels.is_empty() || labels.contains(&e.label()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if loaded {
            return Ok(local);
        }
        let mut clauses = vec![format!("NOT r.{} IN $ids", self.id_field)];
        if labels.len() > 1 {
            clauses.push("type(r) IN $labels".to_string());
        }
        if let Some(predicate) = self.partition.match_predicate("m") {
            clauses.push(predicate);
        }
        let text = format!(
            "MATCH {} WHERE {} RETURN n, r, m",
            self.traversal_shape(&anchor, direction, labels),
            clauses.join(" AND ")
        );
        let mut statement = Statement::new(text).parameter("id", id).parameter(
            "ids",
            Value::List(known.iter().map(Value::from).collect()),
        );
        if labels.len() > 1 {
            statement = statement.parameter(
                "labels",
                Value::List(labels.iter().map(|l| Value::from(*l)).collect()),
            );
        }
        let streamed = self.stream_edges(statement)?;
        let mut out = local;
        for eid in streamed {
            if !out.contains(&eid) {
                out.push(eid);
            }
        }
        if labels.is_empty() {
            if let Some(vertex) = self.vertices.get_mut(id) {
                if matches!(direction, Direction::Out | Direction::Both) {
                    vertex.out_edges_loaded = true;
                }
                if matches!(direction, Direction::In | Direction::Both) {
                    vertex.in_edges_loaded = true;
                }
            }
        }
        Ok(out)
    }

    /// Adjacent vertices of a vertex, filtered by direction and edge labels.
    pub fn vertex_neighbors(
        &mut self,
        id: &ElementId,
        direction: Direction,
        labels: &[&str],
    ) -> Result<Vec<ElementId>> {
        self.read_write()?;
        let (anchor, known, loaded) = {
            let vertex = self.vertices.get(id).ok_or_else(|| {
                GraphError::user_input(format!("vertex {} is not in this session", id))
            })?;
            (
                vertex.match_pattern("n", &self.id_field, "id"),
                Self::incident_ids(vertex, direction),
                Self::direction_loaded(vertex, direction),
            )
        };
        let mut out: Vec<ElementId> = Vec::new();
        for eid in &known {
            let Some(edge) = self.edges.get(eid) else {
                continue;
            };
            if !(labels.is_empty() || labels.contains(&edge.label())) {
                continue;
            }
            let far = match direction {
                Direction::Out => edge.in_id(),
                Direction::In => edge.out_id(),
                Direction::Both => match edge.other_end(id) {
                    Some(far) => far,
                    None => continue,
                },
            };
            if self.vertices.contains_key(far) && !out.contains(far) {
                out.push(far.clone());
            }
        }
        if loaded {
            return Ok(out);
        }
        let mut clauses: Vec<String> = Vec::new();
        if labels.len() > 1 {
            clauses.push("type(r) IN $labels".to_string());
        }
        if let Some(predicate) = self.partition.match_predicate("m") {
            clauses.push(predicate);
        }
        let mut text = format!("MATCH {}", self.traversal_shape(&anchor, direction, labels));
        if !clauses.is_empty() {
            text.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
        }
        text.push_str(" RETURN m");
        let mut statement = Statement::new(text).parameter("id", id);
        if labels.len() > 1 {
            statement = statement.parameter(
                "labels",
                Value::List(labels.iter().map(|l| Value::from(*l)).collect()),
            );
        }
        let stream = self.run(statement)?;
        let mut nodes: Vec<WireNode> = Vec::new();
        for record in stream {
            let record = record?;
            nodes.push(record.get(0)?.as_node()?.clone());
        }
        for node in nodes {
            if let Some(vid) = self.load_vertex(&node)? {
                if !out.contains(&vid) {
                    out.push(vid);
                }
            }
        }
        Ok(out)
    }

    /// Runs an arbitrary statement and materializes the first column as
    /// vertices.
    pub fn query_vertices(&mut self, statement: Statement) -> Result<Vec<ElementId>> {
        let stream = self.run(statement)?;
        let mut nodes: Vec<WireNode> = Vec::new();
        for record in stream {
            let record = record?;
            nodes.push(record.get(0)?.as_node()?.clone());
        }
        let mut out = Vec::new();
        for node in nodes {
            if let Some(id) = self.load_vertex(&node)? {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    /// Runs an arbitrary statement and materializes `(n, r, m)` rows as
    /// edges.
    pub fn query_edges(&mut self, statement: Statement) -> Result<Vec<ElementId>> {
        let loaded = self.stream_edges(statement)?;
        let mut out = Vec::new();
        for id in loaded {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Runs an arbitrary statement and collects the raw records.
    pub fn execute(&mut self, statement: Statement) -> Result<Vec<Record>> {
        let stream = self.run(statement)?;
        let mut records = Vec::new();
        for record in stream {
            records.push(record?);
        }
        Ok(records)
    }
}
