use thiserror::Error;

use crate::codec::EncodingMode;
use crate::lock::LockError;

/// Errors surfaced by the idempotent and aggregation repositories.
///
/// Nothing here is retried internally. A failed call aborts the unit of work
/// that issued it and leaves every other key untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backing store failed (I/O, connectivity, poisoned state).
    #[error("storage error: {0}")]
    Storage(String),

    /// The stored encoding of a field disagrees with the current configuration.
    #[error(
        "codec mismatch on field `{field}`: stored as {stored}, configured as {configured}"
    )]
    CodecMismatch {
        field: String,
        stored: EncodingMode,
        configured: EncodingMode,
    },

    /// A value could not be encoded in the requested mode, or its bytes are corrupt.
    #[error("codec error on field `{field}`: {message}")]
    Codec { field: String, message: String },

    /// A conditional write lost against a writer sharing the same backend.
    #[error(
        "concurrent modification of `{key}` (expected version {expected}, found {actual:?})"
    )]
    ConcurrentModification {
        key: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),

    #[error("operation cancelled during {0}")]
    Cancelled(&'static str),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RepositoryError {
    /// Shorthand for a codec error on a named field.
    pub(crate) fn codec(field: impl Into<String>, message: impl ToString) -> Self {
        RepositoryError::Codec {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// True for errors raised by a deadline or cancellation token.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            RepositoryError::DeadlineExceeded(_)
                | RepositoryError::Cancelled(_)
                | RepositoryError::Lock(LockError::Expired(_))
                | RepositoryError::Lock(LockError::Cancelled(_))
        )
    }
}
