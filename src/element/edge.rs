use std::collections::BTreeMap;

use crate::driver::Statement;
use crate::element::Vertex;
use crate::error::Result;
use crate::model::{cypher_label, ElementId, Value};

/// A directed edge in the working set.
///
/// The label and both endpoints are fixed at creation; only properties may
/// change afterwards. Endpoints are held as id handles resolved through the
/// session registries.
#[derive(Debug, Clone)]
pub struct Edge {
    id: ElementId,
    label: String,
    out_id: ElementId,
    in_id: ElementId,
    properties: BTreeMap<String, Value>,
    original_properties: BTreeMap<String, Value>,
    dirty: bool,
    transient: bool,
}

impl Edge {
    pub(crate) fn transient(
        id: ElementId,
        label: impl Into<String>,
        out_id: ElementId,
        in_id: ElementId,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            out_id,
            in_id,
            properties: BTreeMap::new(),
            original_properties: BTreeMap::new(),
            dirty: false,
            transient: true,
        }
    }

    pub(crate) fn persisted(
        id: ElementId,
        label: impl Into<String>,
        out_id: ElementId,
        in_id: ElementId,
        properties: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            out_id,
            in_id,
            original_properties: properties.clone(),
            properties,
            dirty: false,
            transient: false,
        }
    }

    /// Identifier of this edge.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Relationship label; immutable after creation.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identifier of the tail (out) vertex.
    pub fn out_id(&self) -> &ElementId {
        &self.out_id
    }

    /// Identifier of the head (in) vertex.
    pub fn in_id(&self) -> &ElementId {
        &self.in_id
    }

    /// True until the edge has been committed once.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// True when properties changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The id of the endpoint opposite to `id`, if `id` is an endpoint.
    pub(crate) fn other_end(&self, id: &ElementId) -> Option<&ElementId> {
        if &self.out_id == id {
            Some(&self.in_id)
        } else if &self.in_id == id {
            Some(&self.out_id)
        } else {
            None
        }
    }

    /// Property value for `key`, if present.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property keys present on the edge.
    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub(crate) fn set_property(&mut self, key: &str, value: Value) -> Result<()> {
        self.properties.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Drops `key`; returns whether it existed.
    pub(crate) fn remove_property(&mut self, key: &str) -> bool {
        let existed = self.properties.remove(key).is_some();
        if existed {
            self.dirty = true;
        }
        existed
    }

    fn property_map(&self, id_field: &str) -> Value {
        let mut map = self.properties.clone();
        map.insert(id_field.to_string(), Value::from(&self.id));
        Value::Map(map)
    }

    pub(crate) fn insert_statement(
        &self,
        out: &Vertex,
        in_: &Vertex,
        id_field: &str,
    ) -> Statement {
        let text = format!(
            "MATCH {}, {} CREATE (o)-[r:{} $ep]->(i)",
            out.match_pattern("o", id_field, "oid"),
            in_.match_pattern("i", id_field, "iid"),
            cypher_label(&self.label)
        );
        Statement::new(text)
            .parameter("oid", &self.out_id)
            .parameter("iid", &self.in_id)
            .parameter("ep", self.property_map(id_field))
    }

    /// Update statement, or `None` when the edge has no pending changes.
    pub(crate) fn update_statement(
        &self,
        out: &Vertex,
        in_: &Vertex,
        id_field: &str,
    ) -> Option<Statement> {
        if !self.dirty {
            return None;
        }
        let text = format!(
            "MATCH {}, {} MERGE (o)-[r:{}{{{}: $id}}]->(i) ON MATCH SET r = $ep",
            out.match_pattern("o", id_field, "oid"),
            in_.match_pattern("i", id_field, "iid"),
            cypher_label(&self.label),
            id_field
        );
        Some(
            Statement::new(text)
                .parameter("oid", &self.out_id)
                .parameter("iid", &self.in_id)
                .parameter("id", &self.id)
                .parameter("ep", self.property_map(id_field)),
        )
    }

    pub(crate) fn delete_statement(
        &self,
        out: &Vertex,
        in_: &Vertex,
        id_field: &str,
    ) -> Statement {
        let text = format!(
            "MATCH {}-[r:{}{{{}: $id}}]->{} DELETE r",
            out.match_pattern("o", id_field, "oid"),
            cypher_label(&self.label),
            id_field,
            in_.match_pattern("i", id_field, "iid")
        );
        Statement::new(text)
            .parameter("oid", &self.out_id)
            .parameter("iid", &self.in_id)
            .parameter("id", &self.id)
    }

    /// Folds the working state into the committed snapshot.
    pub(crate) fn finalize_commit(&mut self) {
        self.original_properties = self.properties.clone();
        self.dirty = false;
        self.transient = false;
    }

    /// Restores the committed snapshot, discarding the working state.
    pub(crate) fn restore(&mut self) {
        self.properties = self.original_properties.clone();
        self.dirty = false;
    }
}
