use std::sync::{Arc, RwLock};

use crate::deadline::Deadline;
use crate::error::RepositoryError;

use super::store::{Backend, ReadTransaction, Transaction};
use super::tables::{read_within, write_within, Tables};

/// In-memory backend backed by `Arc<RwLock<Tables>>`.
///
/// Clone-friendly (cloning shares the same underlying storage). Reads share the
/// lock; transactions take it exclusively and roll back through an undo log.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for InMemoryBackend {
    fn read<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn ReadTransaction) -> Result<T, RepositoryError>,
    {
        deadline.check("read")?;
        let tables = read_within(&self.tables, deadline, "in-memory")?;
        work(&tables.view())
    }

    fn transaction<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, RepositoryError>,
    {
        let mut tables = write_within(&self.tables, deadline, "in-memory")?;
        tables.run(deadline, work, |_| Ok(()))
    }
}
