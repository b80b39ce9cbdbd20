//! Element state machines.
//!
//! Vertices, edges and vertex properties live inside a session's working
//! set. Each element tracks whether it is transient (created this
//! transaction), dirty (modified since the last commit), or deleted, keeps
//! the snapshots needed for rollback, and emits the insert/update/delete
//! statements that persist it. Elements reference each other exclusively
//! through [`crate::model::ElementId`] handles resolved by the session, so
//! the working set forms no reference cycles.

mod edge;
mod property;
mod vertex;

pub use edge::Edge;
pub use property::VertexProperty;
pub use vertex::Vertex;
