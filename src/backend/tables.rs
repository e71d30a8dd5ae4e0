//! Table state shared by the in-process backends, with undo-log transactions.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::deadline::Deadline;
use crate::error::RepositoryError;

use super::store::{row_version, ReadTransaction, Transaction};
use super::Row;

/// How often a caller blocked on busy tables looks at its deadline again.
const BUSY_POLL: Duration = Duration::from_millis(2);

/// Shared read access to `tables`, giving up when `deadline` stops the wait.
pub(crate) fn read_within<'a>(
    tables: &'a RwLock<Tables>,
    deadline: &Deadline,
    name: &str,
) -> Result<RwLockReadGuard<'a, Tables>, RepositoryError> {
    if deadline.is_unbounded() {
        return tables.read().map_err(|_| poisoned(name));
    }
    loop {
        match tables.try_read() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned(name)),
            Err(TryLockError::WouldBlock) => {
                deadline.check("waiting for backend")?;
                thread::sleep(poll_interval(deadline));
            }
        }
    }
}

/// Exclusive access to `tables`, giving up when `deadline` stops the wait.
pub(crate) fn write_within<'a>(
    tables: &'a RwLock<Tables>,
    deadline: &Deadline,
    name: &str,
) -> Result<RwLockWriteGuard<'a, Tables>, RepositoryError> {
    if deadline.is_unbounded() {
        return tables.write().map_err(|_| poisoned(name));
    }
    loop {
        match tables.try_write() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned(name)),
            Err(TryLockError::WouldBlock) => {
                deadline.check("waiting for backend")?;
                thread::sleep(poll_interval(deadline));
            }
        }
    }
}

fn poll_interval(deadline: &Deadline) -> Duration {
    deadline
        .remaining()
        .map_or(BUSY_POLL, |left| left.min(BUSY_POLL))
}

fn poisoned(name: &str) -> RepositoryError {
    RepositoryError::Storage(format!("{} tables poisoned", name))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct LogEntry {
    sequence: u64,
    row: Row,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct AppendLog {
    last_sequence: u64,
    entries: Vec<LogEntry>,
}

/// Keyed tables plus append-only logs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    keyed: BTreeMap<String, BTreeMap<String, Row>>,
    logs: BTreeMap<String, AppendLog>,
}

impl Tables {
    /// Run `work` in a transaction. `persist` sees the committed state when the
    /// transaction wrote anything; if it fails, the writes are undone.
    pub(crate) fn run<T, F, P>(
        &mut self,
        deadline: &Deadline,
        work: F,
        persist: P,
    ) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, RepositoryError>,
        P: FnOnce(&Tables) -> Result<(), RepositoryError>,
    {
        deadline.check("transaction begin")?;
        let mut tx = TablesTx {
            tables: self,
            undo: Vec::new(),
        };

        let outcome = work(&mut tx).and_then(|value| {
            deadline.check("transaction commit")?;
            Ok(value)
        });

        let outcome = match outcome {
            Ok(value) if tx.undo.is_empty() => Ok(value),
            Ok(value) => persist(tx.tables).map(|()| value),
            Err(err) => Err(err),
        };

        if let Err(err) = &outcome {
            if !tx.undo.is_empty() {
                warn!(error = %err, writes = tx.undo.len(), "rolling back transaction");
            }
            tx.rollback();
        }
        outcome
    }

    pub(crate) fn view(&self) -> TablesView<'_> {
        TablesView { tables: self }
    }

    fn select(&self, table: &str, key: &str) -> Option<Row> {
        self.keyed.get(table).and_then(|rows| rows.get(key)).cloned()
    }

    fn scan(&self, table: &str) -> Vec<(String, Row)> {
        self.keyed
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(key, row)| (key.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn scan_append_only(&self, table: &str) -> Vec<(u64, Row)> {
        self.logs
            .get(table)
            .map(|log| {
                log.entries
                    .iter()
                    .map(|entry| (entry.sequence, entry.row.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

enum Undo {
    Keyed {
        table: String,
        key: String,
        previous: Option<Row>,
    },
    Cleared {
        table: String,
        rows: BTreeMap<String, Row>,
    },
    Appended {
        table: String,
    },
}

/// Read-only view for `Backend::read`.
pub(crate) struct TablesView<'a> {
    tables: &'a Tables,
}

impl ReadTransaction for TablesView<'_> {
    fn select(&self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError> {
        Ok(self.tables.select(table, key))
    }

    fn scan(&self, table: &str) -> Result<Vec<(String, Row)>, RepositoryError> {
        Ok(self.tables.scan(table))
    }

    fn scan_append_only(&self, table: &str) -> Result<Vec<(u64, Row)>, RepositoryError> {
        Ok(self.tables.scan_append_only(table))
    }
}

struct TablesTx<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
}

impl TablesTx<'_> {
    fn put(&mut self, table: &str, key: &str, row: Row) -> Option<Row> {
        let previous = self
            .tables
            .keyed
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row);
        self.undo.push(Undo::Keyed {
            table: table.to_string(),
            key: key.to_string(),
            previous: previous.clone(),
        });
        previous
    }

    fn rollback(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Keyed {
                    table,
                    key,
                    previous,
                } => {
                    let rows = self.tables.keyed.entry(table).or_default();
                    match previous {
                        Some(row) => {
                            rows.insert(key, row);
                        }
                        None => {
                            rows.remove(&key);
                        }
                    }
                }
                Undo::Cleared { table, rows } => {
                    self.tables.keyed.insert(table, rows);
                }
                Undo::Appended { table } => {
                    if let Some(log) = self.tables.logs.get_mut(&table) {
                        log.entries.pop();
                        log.last_sequence = log.last_sequence.saturating_sub(1);
                    }
                }
            }
        }
    }
}

impl ReadTransaction for TablesTx<'_> {
    fn select(&self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError> {
        Ok(self.tables.select(table, key))
    }

    fn scan(&self, table: &str) -> Result<Vec<(String, Row)>, RepositoryError> {
        Ok(self.tables.scan(table))
    }

    fn scan_append_only(&self, table: &str) -> Result<Vec<(u64, Row)>, RepositoryError> {
        Ok(self.tables.scan_append_only(table))
    }
}

impl Transaction for TablesTx<'_> {
    fn upsert(&mut self, table: &str, key: &str, row: Row) -> Result<Option<Row>, RepositoryError> {
        Ok(self.put(table, key, row))
    }

    fn insert(&mut self, table: &str, key: &str, row: Row) -> Result<bool, RepositoryError> {
        if self.tables.select(table, key).is_some() {
            return Ok(false);
        }
        self.put(table, key, row);
        Ok(true)
    }

    fn update_if_version(
        &mut self,
        table: &str,
        key: &str,
        expected: u64,
        row: Row,
    ) -> Result<bool, RepositoryError> {
        let current = self
            .tables
            .keyed
            .get(table)
            .and_then(|rows| rows.get(key))
            .and_then(row_version);
        if current != Some(expected) {
            return Ok(false);
        }
        self.put(table, key, row);
        Ok(true)
    }

    fn delete(&mut self, table: &str, key: &str) -> Result<Option<Row>, RepositoryError> {
        let previous = self
            .tables
            .keyed
            .get_mut(table)
            .and_then(|rows| rows.remove(key));
        if previous.is_some() {
            self.undo.push(Undo::Keyed {
                table: table.to_string(),
                key: key.to_string(),
                previous: previous.clone(),
            });
        }
        Ok(previous)
    }

    fn clear(&mut self, table: &str) -> Result<usize, RepositoryError> {
        let rows = self.tables.keyed.remove(table).unwrap_or_default();
        let removed = rows.len();
        if removed > 0 {
            self.undo.push(Undo::Cleared {
                table: table.to_string(),
                rows,
            });
        }
        Ok(removed)
    }

    fn insert_append_only(&mut self, table: &str, row: Row) -> Result<u64, RepositoryError> {
        let log = self.tables.logs.entry(table.to_string()).or_default();
        log.last_sequence += 1;
        let sequence = log.last_sequence;
        log.entries.push(LogEntry { sequence, row });
        self.undo.push(Undo::Appended {
            table: table.to_string(),
        });
        Ok(sequence)
    }
}
