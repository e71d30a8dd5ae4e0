use crate::deadline::Deadline;

use super::LockError;

/// Trait for a single lock instance.
///
/// Implementations provide a deadline-aware blocking lock, a non-blocking
/// try-lock, and unlock. In-memory locks use `Mutex` + `Condvar`; a lock shared
/// between processes might sit on a database advisory lock or a lease.
pub trait Lock: Send + Sync {
    /// Acquire the lock, blocking until it becomes available or `deadline` stops the wait.
    fn lock_within(&self, deadline: &Deadline) -> Result<(), LockError>;

    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError> {
        self.lock_within(&Deadline::never())
    }

    /// Try to acquire the lock without blocking.
    /// Returns `Ok(true)` if acquired, `Ok(false)` if already held.
    fn try_lock(&self) -> Result<bool, LockError>;

    /// Release the lock.
    fn unlock(&self) -> Result<(), LockError>;
}
