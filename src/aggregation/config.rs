use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::codec::EncodingMode;
use crate::error::RepositoryError;

use super::row::RESERVED_COLUMNS;

/// Settings for an [`AggregationStore`](super::AggregationStore).
///
/// The encoding settings are read on every call, so changing them between
/// calls changes how the next write is stored and how the next read is
/// expected to look.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Table of in-progress aggregations, one row per correlation key.
    pub active_table: String,
    /// Append-only log of completed aggregations.
    pub completed_table: String,
    /// Store the body as readable text instead of a binary blob.
    pub store_body_as_text: bool,
    /// Headers stored as readable text, each in a column named after the header.
    pub text_header_names: BTreeSet<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            active_table: "aggregation_repository".to_string(),
            completed_table: "aggregation_repository_completed".to_string(),
            store_body_as_text: false,
            text_header_names: BTreeSet::new(),
        }
    }
}

impl AggregationConfig {
    pub fn with_tables(mut self, active: impl Into<String>, completed: impl Into<String>) -> Self {
        self.active_table = active.into();
        self.completed_table = completed.into();
        self
    }

    pub fn with_store_body_as_text(mut self, as_text: bool) -> Self {
        self.store_body_as_text = as_text;
        self
    }

    pub fn with_text_header_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_header_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn body_mode(&self) -> EncodingMode {
        EncodingMode::text_if(self.store_body_as_text)
    }

    pub fn header_mode(&self, name: &str) -> EncodingMode {
        EncodingMode::text_if(self.text_header_names.contains(name))
    }

    /// Reject header names that would collide with the store's own columns.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.active_table.is_empty() || self.completed_table.is_empty() {
            return Err(RepositoryError::Config("table names must not be empty".into()));
        }
        if self.active_table == self.completed_table {
            return Err(RepositoryError::Config(format!(
                "active and completed tables are both `{}`",
                self.active_table
            )));
        }
        for name in &self.text_header_names {
            if name.is_empty() {
                return Err(RepositoryError::Config("empty text header name".into()));
            }
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(RepositoryError::Config(format!(
                    "text header `{}` collides with a reserved column",
                    name
                )));
            }
        }
        Ok(())
    }
}
