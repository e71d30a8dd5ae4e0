use tracing::{debug, warn};

use crate::backend::{Backend, Column, ReadTransaction, Row};
use crate::deadline::Deadline;
use crate::error::RepositoryError;
use crate::lock::{InMemoryLockManager, LockManager};

use super::{IdempotentConfig, IdempotentRepository};

const PROCESSOR_COLUMN: &str = "processor";
const MESSAGE_ID_COLUMN: &str = "message_id";
const CONFIRMED_COLUMN: &str = "confirmed";
const CREATED_AT_COLUMN: &str = "created_at";

/// Idempotent repository over a transactional [`Backend`].
///
/// Each id is a row keyed by `"processor:id"`. `add` is a unique-key insert
/// run under the per-id lock, so it stays exactly-once even when several
/// processes share the backend and the in-process lock cannot see them.
pub struct IdempotentStore<B, L = InMemoryLockManager> {
    backend: B,
    locks: L,
    config: IdempotentConfig,
}

impl<B: Backend> IdempotentStore<B> {
    pub fn new(backend: B, config: IdempotentConfig) -> Self {
        Self::with_lock_manager(backend, InMemoryLockManager::new(), config)
    }
}

impl<B: Backend, L: LockManager> IdempotentStore<B, L> {
    pub fn with_lock_manager(backend: B, locks: L, config: IdempotentConfig) -> Self {
        IdempotentStore {
            backend,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &IdempotentConfig {
        &self.config
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of ids recorded for this processor.
    pub fn len(&self) -> Result<usize, RepositoryError> {
        self.backend.read(&Deadline::never(), |view| {
            Ok(view
                .scan(&self.config.table)?
                .iter()
                .filter(|(_, row)| self.owns(row))
                .count())
        })
    }

    pub fn is_empty(&self) -> Result<bool, RepositoryError> {
        Ok(self.len()? == 0)
    }

    /// `"<len>:<processor>:<id>"`. The length prefix keeps keys distinct even
    /// when processor names or ids contain the separator.
    fn row_key(&self, message_id: &str) -> String {
        let processor = &self.config.processor_name;
        format!("{}:{}:{}", processor.len(), processor, message_id)
    }

    fn lock_key(&self, message_id: &str) -> String {
        format!("idempotent:{}", self.row_key(message_id))
    }

    fn owns(&self, row: &Row) -> bool {
        row.get(PROCESSOR_COLUMN).and_then(Column::as_text)
            == Some(self.config.processor_name.as_str())
    }

    /// Whether `row` records exactly `message_id` for this processor.
    fn records(&self, row: &Row, message_id: &str) -> bool {
        self.owns(row) && row.get(MESSAGE_ID_COLUMN).and_then(Column::as_text) == Some(message_id)
    }

    /// Select the row for `message_id`, failing if its key holds someone else's id.
    fn select_own<V: ReadTransaction + ?Sized>(
        &self,
        view: &V,
        key: &str,
        message_id: &str,
    ) -> Result<Option<Row>, RepositoryError> {
        match view.select(&self.config.table, key)? {
            Some(row) if !self.records(&row, message_id) => {
                warn!(key, message_id, "row key holds a different processor or id");
                Err(RepositoryError::Storage(format!(
                    "row `{}` in `{}` does not belong to processor `{}`",
                    key, self.config.table, self.config.processor_name
                )))
            }
            row => Ok(row),
        }
    }

    fn new_row(&self, message_id: &str) -> Row {
        Row::from([
            (
                PROCESSOR_COLUMN.to_string(),
                Column::Text(self.config.processor_name.clone()),
            ),
            (
                MESSAGE_ID_COLUMN.to_string(),
                Column::Text(message_id.to_string()),
            ),
            (CONFIRMED_COLUMN.to_string(), Column::Integer(0)),
            (CREATED_AT_COLUMN.to_string(), Column::timestamp_now()),
        ])
    }
}

impl<B: Backend, L: LockManager> IdempotentRepository for IdempotentStore<B, L> {
    fn add_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError> {
        let _guard = self.locks.acquire(&self.lock_key(message_id), deadline)?;
        let key = self.row_key(message_id);
        let row = self.new_row(message_id);

        let added = self.backend.transaction(deadline, |tx| {
            if self.select_own(&*tx, &key, message_id)?.is_some() {
                return Ok(false);
            }
            tx.insert(&self.config.table, &key, row)
        })?;
        debug!(processor = %self.config.processor_name, message_id, added, "idempotent add");
        Ok(added)
    }

    fn contains_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError> {
        let key = self.row_key(message_id);
        self.backend.read(deadline, |view| {
            Ok(view
                .select(&self.config.table, &key)?
                .is_some_and(|row| self.records(&row, message_id)))
        })
    }

    fn remove_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError> {
        let _guard = self.locks.acquire(&self.lock_key(message_id), deadline)?;
        let key = self.row_key(message_id);

        let removed = self.backend.transaction(deadline, |tx| {
            if self.select_own(&*tx, &key, message_id)?.is_none() {
                return Ok(false);
            }
            Ok(tx.delete(&self.config.table, &key)?.is_some())
        })?;
        debug!(processor = %self.config.processor_name, message_id, removed, "idempotent remove");
        Ok(removed)
    }

    fn confirm_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError> {
        let _guard = self.locks.acquire(&self.lock_key(message_id), deadline)?;
        let key = self.row_key(message_id);
        let table = &self.config.table;

        let confirmed = self.backend.transaction(deadline, |tx| {
            let Some(mut row) = self.select_own(&*tx, &key, message_id)? else {
                return Ok(false);
            };
            if row.get(CONFIRMED_COLUMN).and_then(Column::as_integer) != Some(1) {
                row.insert(CONFIRMED_COLUMN.to_string(), Column::Integer(1));
                tx.upsert(table, &key, row)?;
            }
            Ok(true)
        })?;
        debug!(processor = %self.config.processor_name, message_id, confirmed, "idempotent confirm");
        Ok(confirmed)
    }

    fn clear(&self) -> Result<(), RepositoryError> {
        let table = &self.config.table;
        let cleared = self.backend.transaction(&Deadline::never(), |tx| {
            let mut cleared = 0usize;
            for (key, row) in tx.scan(table)? {
                if self.owns(&row) {
                    tx.delete(table, &key)?;
                    cleared += 1;
                }
            }
            Ok(cleared)
        })?;
        debug!(processor = %self.config.processor_name, cleared, "idempotent clear");
        Ok(())
    }
}
