use thiserror::Error;

/// Error type for lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The underlying lock primitive was poisoned (e.g. a thread panicked while holding it).
    #[error("lock poisoned: {0}")]
    Poisoned(String),
    /// The deadline passed while waiting for the lock.
    #[error("lock expired: {0}")]
    Expired(String),
    /// The caller's cancellation token fired while waiting for the lock.
    #[error("lock wait cancelled: {0}")]
    Cancelled(String),
}
