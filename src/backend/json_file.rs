use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::deadline::Deadline;
use crate::error::RepositoryError;

use super::store::{Backend, ReadTransaction, Transaction};
use super::tables::{read_within, write_within, Tables};

/// Backend that keeps its tables in memory and rewrites a JSON file after
/// every committed transaction that changed something.
///
/// The file is written to a sibling temp file and renamed into place, so a
/// crash leaves either the old or the new state. Reopening the same path
/// restores the active tables and completed logs.
#[derive(Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
    tables: Arc<RwLock<Tables>>,
}

impl JsonFileBackend {
    /// Open `path`, loading existing state or starting empty if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let tables = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RepositoryError::Storage(format!("corrupt store file {}: {}", path.display(), e))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => Tables::default(),
            Err(err) => {
                return Err(RepositoryError::Storage(format!(
                    "reading {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        debug!(path = %path.display(), "opened json file backend");

        Ok(Self {
            path,
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn persist(path: &Path, tables: &Tables) -> Result<(), RepositoryError> {
    let bytes = serde_json::to_vec_pretty(tables)
        .map_err(|e| RepositoryError::Storage(format!("serializing store: {}", e)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|e| RepositoryError::Storage(format!("writing {}: {}", path.display(), e)))
}

impl Backend for JsonFileBackend {
    fn read<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&dyn ReadTransaction) -> Result<T, RepositoryError>,
    {
        deadline.check("read")?;
        let tables = read_within(&self.tables, deadline, "json file")?;
        work(&tables.view())
    }

    fn transaction<T, F>(&self, deadline: &Deadline, work: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, RepositoryError>,
    {
        let mut tables = write_within(&self.tables, deadline, "json file")?;
        tables.run(deadline, work, |committed| persist(&self.path, committed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Column, Row};

    fn row(value: &str) -> Row {
        Row::from([
            ("value".to_string(), Column::Text(value.to_string())),
            ("blob".to_string(), Column::Binary(vec![7, 8, 9])),
        ])
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let backend = JsonFileBackend::open(&path).unwrap();
            backend
                .transaction(&Deadline::never(), |tx| {
                    tx.upsert("active", "k1", row("A"))?;
                    tx.insert_append_only("completed", row("done"))?;
                    Ok(())
                })
                .unwrap();
        }

        let reopened = JsonFileBackend::open(&path).unwrap();
        let (active, completed) = reopened
            .read(&Deadline::never(), |view| {
                Ok((view.select("active", "k1")?, view.scan_append_only("completed")?))
            })
            .unwrap();
        assert_eq!(active, Some(row("A")));
        assert_eq!(completed, vec![(1, row("done"))]);
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path().join("nothing.json")).unwrap();
        let rows = backend.read(&Deadline::never(), |view| view.scan("active")).unwrap();
        assert!(rows.is_empty());
        assert!(!backend.path().exists());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{not json").unwrap();

        let err = JsonFileBackend::open(&path).err().unwrap();
        assert!(matches!(err, RepositoryError::Storage(_)));
    }

    #[test]
    fn unwritable_path_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("store.json");
        let backend = JsonFileBackend::open(&path).unwrap();

        let result = backend.transaction(&Deadline::never(), |tx| {
            tx.upsert("active", "k1", row("A")).map(|_| ())
        });
        assert!(matches!(result, Err(RepositoryError::Storage(_))));

        let active = backend
            .read(&Deadline::never(), |view| view.select("active", "k1"))
            .unwrap();
        assert!(active.is_none());
    }
}
