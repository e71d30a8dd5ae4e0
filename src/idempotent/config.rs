use serde::{Deserialize, Serialize};

/// Settings for an [`IdempotentStore`](super::IdempotentStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotentConfig {
    /// Scopes ids, so several repositories can share one backend table.
    pub processor_name: String,
    /// Backend table holding the ids.
    pub table: String,
}

impl Default for IdempotentConfig {
    fn default() -> Self {
        Self {
            processor_name: "default".to_string(),
            table: "idempotent_repository".to_string(),
        }
    }
}

impl IdempotentConfig {
    pub fn with_processor_name(mut self, name: impl Into<String>) -> Self {
        self.processor_name = name.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}
