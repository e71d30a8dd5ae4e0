//! A minimal aggregator: string-concatenation strategy plus completion size,
//! composed from the repository primitives the way a pipeline would.

use std::sync::Mutex;

use exchange_repository::{AggregationRecord, AggregationRepository, RepositoryError, Value};

pub struct ConcatAggregator<R> {
    repo: R,
    completion_size: usize,
    counts: Mutex<std::collections::HashMap<String, usize>>,
    emitted: Mutex<Vec<AggregationRecord>>,
}

impl<R: AggregationRepository> ConcatAggregator<R> {
    pub fn new(repo: R, completion_size: usize) -> Self {
        Self {
            repo,
            completion_size,
            counts: Mutex::new(Default::default()),
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Merge `incoming` into the group for `key`; emit when the group is full.
    pub fn process(&self, key: &str, incoming: AggregationRecord) -> Result<(), RepositoryError> {
        let merged = match self.repo.get(key)? {
            None => incoming,
            Some(existing) => {
                let body = format!("{}{}", text(&existing.body), text(&incoming.body));
                AggregationRecord {
                    body: Value::Text(body),
                    headers: incoming.headers,
                }
            }
        };
        self.repo.add(key, &merged)?;

        let size = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(key.to_string()).or_default();
            *count += 1;
            *count
        };
        if size >= self.completion_size {
            self.repo.complete(key, &merged)?;
            self.counts.lock().unwrap().remove(key);
            self.emitted.lock().unwrap().push(merged);
        }
        Ok(())
    }

    pub fn emitted(&self) -> Vec<AggregationRecord> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }
}

fn text(value: &Value) -> String {
    value.render_text().unwrap_or_default()
}
