use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::Value;

/// Accumulated state for one correlation key.
///
/// The store replaces the whole record on every `add`; merging a new message
/// into it is the caller's aggregation strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationRecord {
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
}

impl AggregationRecord {
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }
}

/// One entry of the completed log.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedRecord {
    /// Position in the completed log.
    pub sequence: u64,
    pub correlation_key: String,
    /// Milliseconds since the Unix epoch.
    pub completed_at: i64,
    pub record: AggregationRecord,
}
