use crate::deadline::Deadline;
use crate::error::RepositoryError;

use super::Row;

/// Column holding the optimistic version of a keyed row.
pub const VERSION_COLUMN: &str = "version";

/// Read access to keyed tables and append-only logs.
pub trait ReadTransaction {
    /// Fetch the row stored under `key`.
    fn select(&self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError>;

    /// All rows of a keyed table, ordered by key.
    fn scan(&self, table: &str) -> Result<Vec<(String, Row)>, RepositoryError>;

    /// All entries of an append-only log, in append order.
    fn scan_append_only(&self, table: &str) -> Result<Vec<(u64, Row)>, RepositoryError>;
}

/// Write access inside one transaction.
///
/// Nothing is visible to other callers until the enclosing
/// [`Backend::transaction`] closure returns `Ok`; an `Err` discards every write.
pub trait Transaction: ReadTransaction {
    /// Insert or replace; returns the replaced row.
    fn upsert(&mut self, table: &str, key: &str, row: Row) -> Result<Option<Row>, RepositoryError>;

    /// Unique-key insert. Returns `false` and writes nothing if `key` exists.
    fn insert(&mut self, table: &str, key: &str, row: Row) -> Result<bool, RepositoryError>;

    /// Replace the row only if its [`VERSION_COLUMN`] equals `expected`.
    /// Returns `false` and writes nothing otherwise (including when absent).
    fn update_if_version(
        &mut self,
        table: &str,
        key: &str,
        expected: u64,
        row: Row,
    ) -> Result<bool, RepositoryError>;

    /// Delete; returns the removed row.
    fn delete(&mut self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError>;

    /// Delete every row of a keyed table; returns how many went.
    fn clear(&mut self, table: &str) -> Result<usize, RepositoryError>;

    /// Append to a log; returns the entry's sequence number (starting at 1).
    fn insert_append_only(&mut self, table: &str, row: Row) -> Result<u64, RepositoryError>;
}

/// A transactional table store the repositories persist into.
///
/// Each logical repository operation runs exactly one `read` or `transaction`
/// call, so connection or lock acquisition is scoped to that call and released
/// on every exit path.
pub trait Backend: Send + Sync {
    /// Run read-only work against a consistent view.
    fn read<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn ReadTransaction) -> Result<T, RepositoryError>;

    /// Run `work` atomically. Commits on `Ok`, rolls back on `Err`, and also
    /// rolls back if `deadline` has passed by the time `work` returns.
    fn transaction<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, RepositoryError>;
}

/// Read the optimistic version of a row, if it carries one.
pub fn row_version(row: &Row) -> Option<u64> {
    row.get(VERSION_COLUMN)
        .and_then(|column| column.as_integer())
        .and_then(|n| u64::try_from(n).ok())
}
