use crate::model::{ElementId, Value};

/// A single value stored under a vertex property key.
///
/// Vertex properties carry their own identifier so multi-valued keys can
/// address individual values. Meta-properties are not supported.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexProperty {
    id: ElementId,
    key: String,
    value: Value,
}

impl VertexProperty {
    pub(crate) fn new(id: ElementId, key: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            key: key.into(),
            value,
        }
    }

    /// Identifier of this property value.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Key the value is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}
