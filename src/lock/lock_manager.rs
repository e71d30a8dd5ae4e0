use std::sync::Arc;

use tracing::trace;

use crate::deadline::Deadline;

use super::{Lock, LockError, LockGuard};

/// Factory trait for obtaining per-key locks.
///
/// Both repositories serialize work on the same id or correlation key through
/// a `LockManager`. Keys are namespaced by the caller (`"idempotent:<id>"`,
/// `"aggregation:<key>"`) so the two stores never contend with each other.
pub trait LockManager: Send + Sync {
    /// The concrete lock type returned by this manager.
    type Lock: Lock;

    /// Get (or create) a lock for the given identifier.
    ///
    /// Repeated calls with the same `id` must return the same logical lock
    /// (i.e. the same `Arc` for in-memory, or the same distributed key).
    fn get_lock(&self, id: &str) -> Result<Arc<Self::Lock>, LockError>;

    /// Lock `id` and return a guard that releases it when dropped.
    fn acquire(&self, id: &str, deadline: &Deadline) -> Result<LockGuard<Self::Lock>, LockError> {
        let lock = self.get_lock(id)?;
        lock.lock_within(deadline)?;
        trace!(key = id, "acquired key lock");
        Ok(LockGuard::new(id, lock))
    }
}
