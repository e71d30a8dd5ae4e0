use std::sync::Arc;

use tracing::warn;

use super::Lock;

/// Holds an acquired lock and releases it on drop, on every exit path.
pub struct LockGuard<L: Lock> {
    key: String,
    lock: Arc<L>,
}

impl<L: Lock> LockGuard<L> {
    pub(crate) fn new(key: &str, lock: Arc<L>) -> Self {
        LockGuard {
            key: key.to_string(),
            lock,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<L: Lock> Drop for LockGuard<L> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock() {
            warn!(key = %self.key, error = %err, "failed to release key lock");
        }
    }
}
