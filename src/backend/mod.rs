//! Transactional table storage behind the repositories.
//!
//! Repositories talk to a [`Backend`] through keyed tables (`select`, `upsert`,
//! unique `insert`, versioned `update_if_version`, `delete`) and append-only
//! logs (`insert_append_only`). A relational database maps these onto tables
//! with a primary key and a sequence column; the in-process backends here
//! implement the same contract.

mod column;
mod in_memory;
#[cfg(feature = "json-file")]
mod json_file;
mod store;
mod tables;

pub use column::{Column, Row};
pub use in_memory::InMemoryBackend;
#[cfg(feature = "json-file")]
pub use json_file::JsonFileBackend;
pub use store::{row_version, Backend, ReadTransaction, Transaction, VERSION_COLUMN};
