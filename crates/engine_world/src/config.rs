//! Storage configuration.

/// Configuration for a [`Storage`](crate::Storage).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Human-readable storage name (e.g. the scene it belongs to). Used to
    /// label log events.
    pub name: String,
    /// Rows to pre-reserve in every newly created archetype table.
    pub row_capacity: usize,
}

impl StorageConfig {
    /// Create a config with the given name and no pre-reserved rows.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            row_capacity: 0,
        }
    }

    /// Pre-reserve `rows` rows in every new archetype table.
    #[must_use]
    pub fn with_row_capacity(mut self, rows: usize) -> Self {
        self.row_capacity = rows;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("storage")
    }
}
