//! Read partitions.
//!
//! A partition is a declarative filter restricting which back-end vertices a
//! session may observe. It is consulted twice: as a pure predicate over label
//! sets when rows are materialized, and as a generator of query fragments
//! when statements are built, so filtering happens server-side whenever the
//! query language can express it.

use crate::model::cypher_label;

/// Declarative vertex filter bound to every session of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPartition {
    /// Every vertex is visible; no fragments are generated.
    Unrestricted,
    /// A vertex is visible iff it carries all of the given labels.
    AllLabels(Vec<String>),
    /// A vertex is visible iff it carries at least one of the given labels.
    AnyLabel(Vec<String>),
}

impl ReadPartition {
    /// Whether user code may add or remove `label` on a vertex.
    ///
    /// Partition labels are reserved: mutating them would move vertices in
    /// or out of the partition behind the session's back.
    pub fn validate_label(&self, label: &str) -> bool {
        match self {
            ReadPartition::Unrestricted => true,
            ReadPartition::AllLabels(labels) | ReadPartition::AnyLabel(labels) => {
                !labels.iter().any(|l| l == label)
            }
        }
    }

    /// Whether a vertex with `labels` belongs to the partition.
    pub fn contains_vertex(&self, labels: &[String]) -> bool {
        match self {
            ReadPartition::Unrestricted => true,
            ReadPartition::AllLabels(required) => {
                required.iter().all(|l| labels.contains(l))
            }
            ReadPartition::AnyLabel(accepted) => {
                accepted.iter().any(|l| labels.contains(l))
            }
        }
    }

    /// Labels to inline into MATCH node patterns.
    pub fn match_pattern_labels(&self) -> &[String] {
        match self {
            ReadPartition::Unrestricted => &[],
            ReadPartition::AllLabels(labels) => labels,
            ReadPartition::AnyLabel(labels) if labels.len() == 1 => labels,
            ReadPartition::AnyLabel(_) => &[],
        }
    }

    /// Predicate to append to a WHERE clause, if the partition needs one.
    ///
    /// Only a multi-label any-label partition cannot be expressed as inlined
    /// pattern labels; it emits a label disjunction over `alias`.
    pub fn match_predicate(&self, alias: &str) -> Option<String> {
        match self {
            ReadPartition::AnyLabel(labels) if labels.len() > 1 => {
                let clauses: Vec<String> = labels
                    .iter()
                    .map(|l| format!("{}:{}", alias, cypher_label(l)))
                    .collect();
                Some(format!("({})", clauses.join(" OR ")))
            }
            _ => None,
        }
    }

    /// Pattern-label fragment, e.g. `` :`A`:`B` ``; empty when none apply.
    pub(crate) fn pattern_fragment(&self) -> String {
        self.match_pattern_labels()
            .iter()
            .map(|l| format!(":{}", cypher_label(l)))
            .collect()
    }
}
