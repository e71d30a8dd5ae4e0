use std::collections::BTreeSet;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::backend::{row_version, Backend, Column, ReadTransaction, Row, Transaction, VERSION_COLUMN};
use crate::deadline::Deadline;
use crate::error::RepositoryError;
use crate::lock::{InMemoryLockManager, LockManager};

use super::row::{
    decode_record, encode_record, COMPLETED_AT_COLUMN, CORRELATION_KEY_COLUMN, SOURCE_VERSION_COLUMN,
};
use super::{AggregationConfig, AggregationRecord, AggregationRepository, CompletedRecord};

/// Aggregation repository over a transactional [`Backend`].
///
/// Writes to one correlation key run under that key's lock and end in a
/// unique insert or a version-conditional update, so a writer in another
/// process sharing the backend surfaces as `ConcurrentModification` rather
/// than a lost update.
pub struct AggregationStore<B, L = InMemoryLockManager> {
    backend: B,
    locks: L,
    config: RwLock<AggregationConfig>,
}

impl<B: Backend> AggregationStore<B> {
    pub fn new(backend: B, config: AggregationConfig) -> Result<Self, RepositoryError> {
        Self::with_lock_manager(backend, InMemoryLockManager::new(), config)
    }
}

impl<B: Backend, L: LockManager> AggregationStore<B, L> {
    pub fn with_lock_manager(
        backend: B,
        locks: L,
        config: AggregationConfig,
    ) -> Result<Self, RepositoryError> {
        config.validate()?;
        Ok(AggregationStore {
            backend,
            locks,
            config: RwLock::new(config),
        })
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Result<AggregationConfig, RepositoryError> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|_| RepositoryError::Config("configuration lock poisoned".into()))
    }

    pub fn set_config(&self, config: AggregationConfig) -> Result<(), RepositoryError> {
        self.update_config(|current| *current = config)
    }

    pub fn set_store_body_as_text(&self, as_text: bool) -> Result<(), RepositoryError> {
        self.update_config(|config| config.store_body_as_text = as_text)
    }

    /// Replace the set of headers stored as text. An empty iterator means none.
    pub fn set_text_header_names<I, S>(&self, names: I) -> Result<(), RepositoryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.update_config(|config| config.text_header_names = names)
    }

    /// Every completed-log entry for `key`, oldest first.
    pub fn completed(&self, key: &str) -> Result<Vec<CompletedRecord>, RepositoryError> {
        let config = self.config()?;
        self.backend.read(&Deadline::never(), |view| {
            view.scan_append_only(&config.completed_table)?
                .into_iter()
                .filter(|(_, row)| belongs_to(row, key))
                .map(|(sequence, row)| {
                    Ok(CompletedRecord {
                        sequence,
                        correlation_key: key.to_string(),
                        completed_at: row
                            .get(COMPLETED_AT_COLUMN)
                            .and_then(Column::as_integer)
                            .unwrap_or_default(),
                        record: decode_record(&row, &config)?,
                    })
                })
                .collect()
        })
    }

    fn update_config<F>(&self, change: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut AggregationConfig),
    {
        let mut config = self
            .config
            .write()
            .map_err(|_| RepositoryError::Config("configuration lock poisoned".into()))?;
        let mut updated = config.clone();
        change(&mut updated);
        updated.validate()?;
        *config = updated;
        Ok(())
    }

    fn lock_key(config: &AggregationConfig, key: &str) -> String {
        format!("aggregation:{}:{}", config.active_table, key)
    }
}

fn belongs_to(row: &Row, key: &str) -> bool {
    row.get(CORRELATION_KEY_COLUMN).and_then(Column::as_text) == Some(key)
}

fn latest_completed<V: ReadTransaction + ?Sized>(
    view: &V,
    table: &str,
    key: &str,
) -> Result<Option<Row>, RepositoryError> {
    Ok(view
        .scan_append_only(table)?
        .into_iter()
        .rev()
        .find(|(_, row)| belongs_to(row, key))
        .map(|(_, row)| row))
}

fn version_column(version: u64) -> Column {
    Column::Integer(i64::try_from(version).unwrap_or(i64::MAX))
}

fn source_version(row: &Row) -> Option<u64> {
    row.get(SOURCE_VERSION_COLUMN)
        .and_then(Column::as_integer)
        .and_then(|n| u64::try_from(n).ok())
}

/// Highest active-row version any completed entry for `key` was taken from.
///
/// A new round for `key` starts above it, so versions never repeat across
/// rounds and a logged version identifies one state of one round.
fn last_logged_version<V: ReadTransaction + ?Sized>(
    view: &V,
    table: &str,
    key: &str,
) -> Result<u64, RepositoryError> {
    Ok(view
        .scan_append_only(table)?
        .iter()
        .filter(|(_, row)| belongs_to(row, key))
        .filter_map(|(_, row)| source_version(row))
        .max()
        .unwrap_or(0))
}

/// Append `content` to the completed log for `key`.
fn append_completed(
    tx: &mut dyn Transaction,
    config: &AggregationConfig,
    key: &str,
    content: Row,
    source: Option<u64>,
) -> Result<u64, RepositoryError> {
    let mut entry = content;
    entry.remove(VERSION_COLUMN);
    entry.insert(CORRELATION_KEY_COLUMN.to_string(), Column::Text(key.to_string()));
    entry.insert(COMPLETED_AT_COLUMN.to_string(), Column::timestamp_now());
    if let Some(version) = source {
        entry.insert(SOURCE_VERSION_COLUMN.to_string(), version_column(version));
    }
    tx.insert_append_only(&config.completed_table, entry)
}

impl<B: Backend, L: LockManager> AggregationRepository for AggregationStore<B, L> {
    fn get_within(
        &self,
        key: &str,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError> {
        let config = self.config()?;
        let row = self
            .backend
            .read(deadline, |view| view.select(&config.active_table, key))?;
        row.map(|row| decode_record(&row, &config))
            .transpose()
            .inspect_err(|err| warn!(key, error = %err, "failed to decode aggregation record"))
    }

    fn add_within(
        &self,
        key: &str,
        record: &AggregationRecord,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError> {
        let config = self.config()?;
        let mut row = encode_record(record, &config)?;
        row.insert(CORRELATION_KEY_COLUMN.to_string(), Column::Text(key.to_string()));

        let _guard = self.locks.acquire(&Self::lock_key(&config, key), deadline)?;
        let table = &config.active_table;

        let (previous, version) = self.backend.transaction(deadline, |tx| {
            match tx.select(table, key)? {
                None => {
                    let first = last_logged_version(&*tx, &config.completed_table, key)? + 1;
                    row.insert(VERSION_COLUMN.to_string(), version_column(first));
                    if !tx.insert(table, key, row)? {
                        let actual = tx.select(table, key)?.as_ref().and_then(row_version);
                        return Err(RepositoryError::ConcurrentModification {
                            key: key.to_string(),
                            expected: 0,
                            actual,
                        });
                    }
                    Ok((None, first))
                }
                Some(existing) => {
                    let previous = decode_record(&existing, &config)?;
                    let expected = row_version(&existing).unwrap_or_default();
                    let next = expected + 1;
                    row.insert(VERSION_COLUMN.to_string(), version_column(next));
                    if !tx.update_if_version(table, key, expected, row)? {
                        let actual = tx.select(table, key)?.as_ref().and_then(row_version);
                        return Err(RepositoryError::ConcurrentModification {
                            key: key.to_string(),
                            expected,
                            actual,
                        });
                    }
                    Ok((Some(previous), next))
                }
            }
        })
        .inspect_err(|err| {
            if matches!(err, RepositoryError::ConcurrentModification { .. }) {
                warn!(key, error = %err, "aggregation add lost a race");
            }
        })?;

        debug!(key, version, replaced = previous.is_some(), "aggregation add");
        Ok(previous)
    }

    fn remove_within(&self, key: &str, deadline: &Deadline) -> Result<bool, RepositoryError> {
        let config = self.config()?;
        let _guard = self.locks.acquire(&Self::lock_key(&config, key), deadline)?;

        let removed = self.backend.transaction(deadline, |tx| {
            Ok(tx.delete(&config.active_table, key)?.is_some())
        })?;
        debug!(key, removed, "aggregation remove");
        Ok(removed)
    }

    fn confirm_within(
        &self,
        key: &str,
        record: Option<&AggregationRecord>,
        deadline: &Deadline,
    ) -> Result<bool, RepositoryError> {
        let config = self.config()?;
        let explicit = record.map(|record| encode_record(record, &config)).transpose()?;
        let _guard = self.locks.acquire(&Self::lock_key(&config, key), deadline)?;

        let appended = self.backend.transaction(deadline, |tx| {
            let (content, source) = match explicit {
                Some(row) => (row, None),
                None => match tx.select(&config.active_table, key)? {
                    Some(active) => {
                        let version = row_version(&active);
                        (active, version)
                    }
                    None => return Ok(false),
                },
            };
            if let Some(version) = source {
                let latest = latest_completed(&*tx, &config.completed_table, key)?;
                if latest.as_ref().and_then(source_version) == Some(version) {
                    return Ok(false);
                }
            }
            append_completed(tx, &config, key, content, source)?;
            Ok(true)
        })?;
        debug!(key, appended, "aggregation confirm");
        Ok(appended)
    }

    fn complete_within(
        &self,
        key: &str,
        record: &AggregationRecord,
        deadline: &Deadline,
    ) -> Result<(), RepositoryError> {
        let config = self.config()?;
        let content = encode_record(record, &config)?;
        let _guard = self.locks.acquire(&Self::lock_key(&config, key), deadline)?;

        let removed = self.backend.transaction(deadline, |tx| {
            let removed = tx.delete(&config.active_table, key)?.is_some();
            append_completed(tx, &config, key, content, None)?;
            Ok(removed)
        })?;
        debug!(key, removed, "aggregation complete");
        Ok(())
    }

    fn recover_within(
        &self,
        key: &str,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError> {
        let config = self.config()?;
        let row = self
            .backend
            .read(deadline, |view| latest_completed(view, &config.completed_table, key))?;
        let recovered = row.map(|row| decode_record(&row, &config)).transpose()?;
        debug!(key, found = recovered.is_some(), "aggregation recover");
        Ok(recovered)
    }

    fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        let config = self.config()?;
        self.backend.read(&Deadline::never(), |view| {
            Ok(view
                .scan(&config.active_table)?
                .into_iter()
                .map(|(key, _)| key)
                .collect())
        })
    }

    fn scan(&self) -> Result<Vec<String>, RepositoryError> {
        let config = self.config()?;
        self.backend.read(&Deadline::never(), |view| {
            let keys: BTreeSet<String> = view
                .scan_append_only(&config.completed_table)?
                .into_iter()
                .filter_map(|(_, row)| {
                    row.get(CORRELATION_KEY_COLUMN)
                        .and_then(Column::as_text)
                        .map(str::to_string)
                })
                .collect();
            Ok(keys.into_iter().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::codec::Value;

    fn store() -> AggregationStore<InMemoryBackend> {
        AggregationStore::new(InMemoryBackend::new(), AggregationConfig::default()).unwrap()
    }

    #[test]
    fn add_returns_previous_record() {
        let repo = store();
        assert_eq!(repo.add("k1", &AggregationRecord::new("A")).unwrap(), None);
        assert_eq!(
            repo.add("k1", &AggregationRecord::new("AB")).unwrap(),
            Some(AggregationRecord::new("A"))
        );
        assert_eq!(repo.get("k1").unwrap(), Some(AggregationRecord::new("AB")));
    }

    #[test]
    fn version_increments_per_add() {
        let repo = store();
        for body in ["A", "AB", "ABC"] {
            repo.add("k1", &AggregationRecord::new(body)).unwrap();
        }
        let row = repo
            .backend()
            .read(&Deadline::never(), |view| view.select("aggregation_repository", "k1"))
            .unwrap()
            .unwrap();
        assert_eq!(row_version(&row), Some(3));
    }

    #[test]
    fn confirm_without_anything_is_a_no_op() {
        let repo = store();
        assert!(!repo.remove("k1").unwrap());
        assert!(!repo.confirm("k1", None).unwrap());
        assert!(repo.recover("k1").unwrap().is_none());
        assert!(repo.scan().unwrap().is_empty());
    }

    #[test]
    fn confirm_uses_active_record_and_dedups() {
        let repo = store();
        repo.add("k1", &AggregationRecord::new("ABC")).unwrap();

        assert!(repo.confirm("k1", None).unwrap());
        assert!(!repo.confirm("k1", None).unwrap());

        repo.add("k1", &AggregationRecord::new("ABCD")).unwrap();
        assert!(repo.confirm("k1", None).unwrap());

        let history = repo.completed("k1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record.body, Value::from("ABC"));
        assert_eq!(history[1].record.body, Value::from("ABCD"));
        assert!(history[0].sequence < history[1].sequence);
    }

    #[test]
    fn explicit_confirms_always_append() {
        let repo = store();
        let record = AggregationRecord::new("ABC");
        assert!(repo.confirm("k1", Some(&record)).unwrap());
        assert!(repo.confirm("k1", Some(&record)).unwrap());
        assert_eq!(repo.completed("k1").unwrap().len(), 2);
    }

    #[test]
    fn identical_rounds_are_each_logged() {
        let repo = store();
        for _ in 0..2 {
            repo.add("k1", &AggregationRecord::new("A")).unwrap();
            repo.complete("k1", &AggregationRecord::new("ABCDE")).unwrap();
        }
        assert_eq!(repo.completed("k1").unwrap().len(), 2);

        for _ in 0..2 {
            repo.add("k2", &AggregationRecord::new("A")).unwrap();
            assert!(repo.confirm("k2", None).unwrap());
            assert!(repo.remove("k2").unwrap());
        }
        assert_eq!(repo.completed("k2").unwrap().len(), 2);
    }

    #[test]
    fn new_round_versions_continue_past_the_log() {
        let repo = store();
        repo.add("k1", &AggregationRecord::new("A")).unwrap();
        repo.add("k1", &AggregationRecord::new("AB")).unwrap();
        repo.confirm("k1", None).unwrap();
        repo.remove("k1").unwrap();

        repo.add("k1", &AggregationRecord::new("A")).unwrap();
        let row = repo
            .backend()
            .read(&Deadline::never(), |view| view.select("aggregation_repository", "k1"))
            .unwrap()
            .unwrap();
        assert_eq!(row_version(&row), Some(3));
    }

    #[test]
    fn complete_moves_record_to_completed_log() {
        let repo = store();
        let done = AggregationRecord::new("ABCDE").with_header("id", 123);
        repo.add("123", &done).unwrap();
        repo.add("456", &AggregationRecord::new("X")).unwrap();

        repo.complete("123", &done).unwrap();

        assert!(repo.get("123").unwrap().is_none());
        assert_eq!(repo.keys().unwrap(), vec!["456".to_string()]);
        assert_eq!(repo.scan().unwrap(), vec!["123".to_string()]);
        assert_eq!(repo.recover("123").unwrap(), Some(done));
    }

    #[test]
    fn invalid_runtime_config_is_rejected_and_kept() {
        let repo = store();
        let err = repo.set_text_header_names(["version"]).unwrap_err();
        assert!(matches!(err, RepositoryError::Config(_)));
        assert!(repo.config().unwrap().text_header_names.is_empty());
    }
}
