//! Backend wrapper that can go offline, stall, or race another writer, for
//! failure-path tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use exchange_repository::{
    Backend, Column, Deadline, InMemoryBackend, ReadTransaction, RepositoryError, Row,
    Transaction,
};

/// Version a simulated foreign writer leaves on the row it touches.
pub const FOREIGN_VERSION: i64 = 99;

/// Wraps an `InMemoryBackend`. Clones share the same switches and storage.
#[derive(Clone, Default)]
pub struct ControlledBackend {
    inner: InMemoryBackend,
    offline: Arc<AtomicBool>,
    stall_ms: Arc<AtomicU64>,
    foreign_write: Arc<Mutex<Option<(String, String)>>>,
}

impl ControlledBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a storage error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Sleep this long after a transaction's writes, before it commits.
    pub fn stall_commits(&self, stall: Duration) {
        self.stall_ms
            .store(stall.as_millis() as u64, Ordering::SeqCst);
    }

    /// In the next transaction, let another process write `table`/`key` just
    /// before the first unique insert or conditional update of that row.
    pub fn race_next_write(&self, table: &str, key: &str) {
        *self.foreign_write.lock().unwrap() = Some((table.to_string(), key.to_string()));
    }

    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    fn check_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("connection refused".into()));
        }
        Ok(())
    }
}

impl Backend for ControlledBackend {
    fn read<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn ReadTransaction) -> Result<T, RepositoryError>,
    {
        self.check_online()?;
        self.inner.read(deadline, work)
    }

    fn transaction<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, RepositoryError>,
    {
        self.check_online()?;
        let stall = Duration::from_millis(self.stall_ms.load(Ordering::SeqCst));
        let foreign = self.foreign_write.lock().unwrap().take();
        self.inner.transaction(deadline, |tx| {
            let mut tx = Racing { inner: tx, foreign };
            let value = work(&mut tx)?;
            if !stall.is_zero() {
                thread::sleep(stall);
            }
            Ok(value)
        })
    }
}

/// Applies one foreign write right before the raced row is written.
struct Racing<'a> {
    inner: &'a mut dyn Transaction,
    foreign: Option<(String, String)>,
}

impl Racing<'_> {
    fn interfere(&mut self, table: &str, key: &str) -> Result<(), RepositoryError> {
        if self.foreign.as_ref() != Some(&(table.to_string(), key.to_string())) {
            return Ok(());
        }
        self.foreign = None;
        let row = Row::from([
            ("version".to_string(), Column::Integer(FOREIGN_VERSION)),
            ("body".to_string(), Column::Text("foreign".into())),
        ]);
        self.inner.upsert(table, key, row).map(|_| ())
    }
}

impl ReadTransaction for Racing<'_> {
    fn select(&self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError> {
        self.inner.select(table, key)
    }

    fn scan(&self, table: &str) -> Result<Vec<(String, Row)>, RepositoryError> {
        self.inner.scan(table)
    }

    fn scan_append_only(&self, table: &str) -> Result<Vec<(u64, Row)>, RepositoryError> {
        self.inner.scan_append_only(table)
    }
}

impl Transaction for Racing<'_> {
    fn upsert(&mut self, table: &str, key: &str, row: Row) -> Result<Option<Row>, RepositoryError> {
        self.inner.upsert(table, key, row)
    }

    fn insert(&mut self, table: &str, key: &str, row: Row) -> Result<bool, RepositoryError> {
        self.interfere(table, key)?;
        self.inner.insert(table, key, row)
    }

    fn update_if_version(
        &mut self,
        table: &str,
        key: &str,
        expected: u64,
        row: Row,
    ) -> Result<bool, RepositoryError> {
        self.interfere(table, key)?;
        self.inner.update_if_version(table, key, expected, row)
    }

    fn delete(&mut self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError> {
        self.inner.delete(table, key)
    }

    fn clear(&mut self, table: &str) -> Result<usize, RepositoryError> {
        self.inner.clear(table)
    }

    fn insert_append_only(&mut self, table: &str, row: Row) -> Result<u64, RepositoryError> {
        self.inner.insert_append_only(table, row)
    }
}
