use crate::partition::ReadPartition;

/// Session factory settings.
///
/// Plain data; construct directly or start from [`Config::default`] and
/// overwrite fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// Property name under which element identifiers are stored.
    pub id_field: String,
    /// Identifiers reserved per round-trip by sequence providers.
    pub pool_size: i64,
    /// Label of the back-end counter node backing sequence providers.
    pub sequence_label: String,
    /// Read partition applied to every session.
    pub partition: ReadPartition,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            pool_size: 1000,
            sequence_label: "UniqueIdGenerator".to_string(),
            partition: ReadPartition::Unrestricted,
        }
    }
}

impl Config {
    /// Settings for tests and small graphs: tiny id pools so counter state
    /// stays easy to reason about.
    pub fn small_pools() -> Self {
        Self {
            pool_size: 10,
            ..Self::default()
        }
    }

    /// Replaces the read partition.
    pub fn with_partition(mut self, partition: ReadPartition) -> Self {
        self.partition = partition;
        self
    }
}
