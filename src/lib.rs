//! Storage contracts for message pipelines.
//!
//! - [`IdempotentRepository`]: at-most-once processing of message ids.
//! - [`AggregationRepository`]: per-correlation-key accumulated records plus a
//!   completed log for audit and recovery, with per-field text or binary
//!   encoding chosen by [`AggregationConfig`].
//!
//! Both run on any transactional [`Backend`] and serialize same-key work
//! through a [`LockManager`].
//!
//! ```ignore
//! use exchange_repository::{
//!     AggregationConfig, AggregationRecord, AggregationRepository, AggregationStore,
//!     IdempotentConfig, IdempotentRepository, IdempotentStore, InMemoryBackend,
//! };
//!
//! let backend = InMemoryBackend::new();
//! let seen = IdempotentStore::new(backend.clone(), IdempotentConfig::default());
//! assert!(seen.add("/tmp/report.txt")?);
//!
//! let config = AggregationConfig::default()
//!     .with_store_body_as_text(true)
//!     .with_text_header_names(["companyName"]);
//! let repo = AggregationStore::new(backend, config)?;
//! repo.add("123", &AggregationRecord::new("A").with_header("companyName", "Acme"))?;
//! ```

pub mod aggregation;
pub mod backend;
pub mod codec;
mod deadline;
mod error;
pub mod idempotent;
pub mod lock;

pub use aggregation::{
    AggregationConfig, AggregationRecord, AggregationRepository, AggregationStore, CompletedRecord,
};
#[cfg(feature = "json-file")]
pub use backend::JsonFileBackend;
pub use backend::{Backend, Column, InMemoryBackend, ReadTransaction, Row, Transaction};
pub use codec::{EncodedField, EncodingMode, Value};
pub use deadline::{CancellationToken, Deadline};
pub use error::RepositoryError;
pub use idempotent::{IdempotentConfig, IdempotentRepository, IdempotentStore};
pub use lock::{InMemoryLockManager, Lock, LockError, LockGuard, LockManager};
