use std::collections::{BTreeMap, BTreeSet};

use smallvec::SmallVec;

use crate::driver::Statement;
use crate::element::VertexProperty;
use crate::error::{GraphError, Result};
use crate::model::{cypher_label, join_labels, Cardinality, ElementId, Value};

type Labels = SmallVec<[String; 2]>;

/// A vertex in the working set.
///
/// State transitions: `transient -> persisted -> deleted`, with
/// `persisted -> dirty -> persisted` cycles resolved by commit or rollback.
/// `match_labels` always holds the last committed label set and is what
/// generated statements match against; `labels` may diverge until commit.
#[derive(Debug, Clone)]
pub struct Vertex {
    id: ElementId,
    labels: Labels,
    match_labels: Labels,
    labels_added: Vec<String>,
    labels_removed: Vec<String>,
    properties: BTreeMap<String, Vec<VertexProperty>>,
    original_properties: BTreeMap<String, Vec<VertexProperty>>,
    cardinalities: BTreeMap<String, Cardinality>,
    original_cardinalities: BTreeMap<String, Cardinality>,
    pub(crate) out_edges: BTreeSet<ElementId>,
    pub(crate) in_edges: BTreeSet<ElementId>,
    dirty: bool,
    transient: bool,
    pub(crate) out_edges_loaded: bool,
    pub(crate) in_edges_loaded: bool,
}

impl Vertex {
    /// A vertex created inside the current transaction.
    ///
    /// Transient vertices cannot have incident edges on the server, so both
    /// adjacency sides start out loaded.
    pub(crate) fn transient(id: ElementId, labels: Vec<String>) -> Self {
        let labels: Labels = labels.into_iter().collect();
        Self {
            id,
            match_labels: labels.clone(),
            labels,
            labels_added: Vec::new(),
            labels_removed: Vec::new(),
            properties: BTreeMap::new(),
            original_properties: BTreeMap::new(),
            cardinalities: BTreeMap::new(),
            original_cardinalities: BTreeMap::new(),
            out_edges: BTreeSet::new(),
            in_edges: BTreeSet::new(),
            dirty: false,
            transient: true,
            out_edges_loaded: true,
            in_edges_loaded: true,
        }
    }

    /// A vertex materialized from a back-end row.
    pub(crate) fn persisted(
        id: ElementId,
        labels: Vec<String>,
        properties: BTreeMap<String, Vec<VertexProperty>>,
        cardinalities: BTreeMap<String, Cardinality>,
    ) -> Self {
        let labels: Labels = labels.into_iter().collect();
        Self {
            id,
            match_labels: labels.clone(),
            labels,
            labels_added: Vec::new(),
            labels_removed: Vec::new(),
            original_properties: properties.clone(),
            properties,
            original_cardinalities: cardinalities.clone(),
            cardinalities,
            out_edges: BTreeSet::new(),
            in_edges: BTreeSet::new(),
            dirty: false,
            transient: false,
            out_edges_loaded: false,
            in_edges_loaded: false,
        }
    }

    /// Identifier of this vertex.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Current label set, in insertion order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Serialized label form, labels joined with `::`.
    pub fn label(&self) -> String {
        join_labels(&self.labels)
    }

    /// True until the vertex has been committed once.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// True when properties changed since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn match_labels(&self) -> &[String] {
        &self.match_labels
    }

    /// True when label mutations are pending since the last commit.
    pub(crate) fn has_label_deltas(&self) -> bool {
        !self.labels_added.is_empty() || !self.labels_removed.is_empty()
    }

    /// True when an update statement would be emitted at commit.
    pub(crate) fn needs_update(&self) -> bool {
        self.dirty || self.has_label_deltas()
    }

    /// The sole value under `key`.
    ///
    /// Returns `None` for an absent key and `MultipleProperties` when the
    /// key holds more than one value.
    pub fn property(&self, key: &str) -> Result<Option<&Value>> {
        match self.properties.get(key) {
            None => Ok(None),
            Some(values) if values.len() == 1 => Ok(Some(values[0].value())),
            Some(_) => Err(GraphError::MultipleProperties(key.to_string())),
        }
    }

    /// All values under `key`, in insertion order.
    pub fn properties(&self, key: &str) -> &[VertexProperty] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Property keys present on the vertex.
    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Cardinality recorded for `key`, if the key exists.
    pub fn cardinality(&self, key: &str) -> Option<Cardinality> {
        self.cardinalities.get(key).copied()
    }

    /// Adds `label`; returns whether the label set changed.
    pub(crate) fn add_label(&mut self, label: &str) -> bool {
        if self.labels.iter().any(|l| l == label) {
            return false;
        }
        self.labels.push(label.to_string());
        if let Some(pos) = self.labels_removed.iter().position(|l| l == label) {
            // Re-adding a label removed in this transaction cancels out.
            self.labels_removed.remove(pos);
        } else {
            self.labels_added.push(label.to_string());
        }
        true
    }

    /// Removes `label`; returns whether the label set changed.
    pub(crate) fn remove_label(&mut self, label: &str) -> bool {
        let Some(pos) = self.labels.iter().position(|l| l == label) else {
            return false;
        };
        self.labels.remove(pos);
        if let Some(added) = self.labels_added.iter().position(|l| l == label) {
            self.labels_added.remove(added);
        } else {
            self.labels_removed.push(label.to_string());
        }
        true
    }

    /// Stores `value` under `key` with the given cardinality.
    ///
    /// Returns whether vertex state changed (a set-cardinality add of an
    /// already-present value does not).
    pub(crate) fn set_property(
        &mut self,
        cardinality: Cardinality,
        key: &str,
        value: Value,
        property_id: ElementId,
    ) -> Result<bool> {
        if let Some(existing) = self.cardinalities.get(key) {
            if *existing != cardinality {
                return Err(GraphError::user_input(format!(
                    "key '{}' already has cardinality {:?}",
                    key, existing
                )));
            }
        }
        let entry = self.properties.entry(key.to_string()).or_default();
        match cardinality {
            Cardinality::Single => {
                entry.clear();
                entry.push(VertexProperty::new(property_id, key, value));
            }
            Cardinality::List => {
                entry.push(VertexProperty::new(property_id, key, value));
            }
            Cardinality::Set => {
                if entry.iter().any(|p| p.value() == &value) {
                    return Ok(false);
                }
                entry.push(VertexProperty::new(property_id, key, value));
            }
        }
        self.cardinalities.insert(key.to_string(), cardinality);
        self.dirty = true;
        Ok(true)
    }

    /// Drops every value under `key`; returns whether the key existed.
    pub(crate) fn remove_property(&mut self, key: &str) -> bool {
        let existed = self.properties.remove(key).is_some();
        self.cardinalities.remove(key);
        if existed {
            self.dirty = true;
        }
        existed
    }

    /// Node pattern matching this vertex by its committed labels,
    /// e.g. `` (n:`Person`{id: $id}) ``.
    pub(crate) fn match_pattern(&self, alias: &str, id_field: &str, id_param: &str) -> String {
        let labels: String = self
            .match_labels
            .iter()
            .map(|l| format!(":{}", cypher_label(l)))
            .collect();
        format!("({}{}{{{}: ${}}})", alias, labels, id_field, id_param)
    }

    /// Property map parameter: all stored properties plus the id field.
    pub(crate) fn property_map(&self, id_field: &str) -> Value {
        let mut map: BTreeMap<String, Value> = BTreeMap::new();
        map.insert(id_field.to_string(), Value::from(&self.id));
        for (key, values) in &self.properties {
            let value = match self.cardinalities.get(key) {
                Some(Cardinality::Single) | None => values[0].value().clone(),
                Some(Cardinality::List) | Some(Cardinality::Set) => {
                    Value::List(values.iter().map(|p| p.value().clone()).collect())
                }
            };
            map.insert(key.clone(), value);
        }
        Value::Map(map)
    }

    pub(crate) fn insert_statement(&self, id_field: &str) -> Statement {
        let labels: String = self
            .labels
            .iter()
            .map(|l| format!(":{}", cypher_label(l)))
            .collect();
        Statement::new(format!("CREATE (v{} $vp)", labels))
            .parameter("vp", self.property_map(id_field))
    }

    /// Update statement, or `None` when the vertex has no pending changes.
    ///
    /// Matches by the committed label set; the working state is only folded
    /// into `match_labels` by [`Vertex::finalize_commit`] once the back-end
    /// confirms, so a failed commit remains fully restorable.
    pub(crate) fn update_statement(&self, id_field: &str) -> Option<Statement> {
        if !self.needs_update() {
            return None;
        }
        let mut text = format!("MERGE {}", self.match_pattern("v", id_field, "id"));
        if self.dirty {
            text.push_str(" ON MATCH SET v = $vp");
        }
        if !self.labels_added.is_empty() {
            let added: String = self
                .labels_added
                .iter()
                .map(|l| format!(":{}", cypher_label(l)))
                .collect();
            text.push_str(&format!(" SET v{}", added));
        }
        if !self.labels_removed.is_empty() {
            let removed: String = self
                .labels_removed
                .iter()
                .map(|l| format!(":{}", cypher_label(l)))
                .collect();
            text.push_str(&format!(" REMOVE v{}", removed));
        }
        let mut statement = Statement::new(text).parameter("id", &self.id);
        if self.dirty {
            statement = statement.parameter("vp", self.property_map(id_field));
        }
        Some(statement)
    }

    pub(crate) fn delete_statement(&self, id_field: &str) -> Statement {
        Statement::new(format!(
            "MATCH {} DETACH DELETE v",
            self.match_pattern("v", id_field, "id")
        ))
        .parameter("id", &self.id)
    }

    /// Folds the working state into the committed snapshot.
    pub(crate) fn finalize_commit(&mut self) {
        self.original_properties = self.properties.clone();
        self.original_cardinalities = self.cardinalities.clone();
        self.match_labels = self.labels.clone();
        self.labels_added.clear();
        self.labels_removed.clear();
        self.dirty = false;
        self.transient = false;
    }

    /// Restores the committed snapshot, discarding the working state.
    pub(crate) fn restore(&mut self) {
        self.properties = self.original_properties.clone();
        self.cardinalities = self.original_cardinalities.clone();
        self.labels = self.match_labels.clone();
        self.labels_added.clear();
        self.labels_removed.clear();
        self.dirty = false;
    }
}
