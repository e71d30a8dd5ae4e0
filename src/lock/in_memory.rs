use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::deadline::Deadline;

use super::{Lock, LockError, LockManager};

/// How often a waiter wakes up to look at its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// In-memory lock backed by `Mutex<bool>` + `Condvar`.
pub struct InMemoryLock {
    state: Mutex<bool>,
    wake: Condvar,
}

impl InMemoryLock {
    pub fn new() -> Self {
        InMemoryLock {
            state: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Whether someone holds the lock right now. A poisoned lock counts as held.
    pub fn is_locked(&self) -> bool {
        self.state.lock().map(|locked| *locked).unwrap_or(true)
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for InMemoryLock {
    fn lock_within(&self, deadline: &Deadline) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;

        while *locked {
            if deadline.is_unbounded() {
                locked = self
                    .wake
                    .wait(locked)
                    .map_err(|e| LockError::Poisoned(e.to_string()))?;
                continue;
            }

            if deadline.is_cancelled() {
                return Err(LockError::Cancelled("waiting for key lock".into()));
            }
            let wait = match deadline.remaining() {
                Some(left) if left.is_zero() => {
                    return Err(LockError::Expired("waiting for key lock".into()));
                }
                Some(left) => left.min(CANCEL_POLL),
                None => CANCEL_POLL,
            };
            let (guard, _) = self
                .wake
                .wait_timeout(locked, wait)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
            locked = guard;
        }

        *locked = true;
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            Ok(false)
        } else {
            *locked = true;
            Ok(true)
        }
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            *locked = false;
            self.wake.notify_one();
        }
        Ok(())
    }
}

/// Idle entries are dropped once the map grows past this many keys.
const MIN_PRUNE_AT: usize = 64;

struct LockTable {
    locks: HashMap<String, Arc<InMemoryLock>>,
    prune_at: usize,
}

/// In-memory lock manager backed by a `HashMap<String, Arc<InMemoryLock>>`.
///
/// Lazily creates one `InMemoryLock` per unique key and returns the same `Arc`
/// for repeated lookups while anyone still holds it. Entries nobody holds or
/// waits on are evicted as the map grows, so unbounded id spaces (file paths)
/// keep the map proportional to in-flight keys. Only serializes callers inside
/// this process; the repositories pair it with conditional writes in the
/// backend.
pub struct InMemoryLockManager {
    table: Mutex<LockTable>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        InMemoryLockManager {
            table: Mutex::new(LockTable {
                locks: HashMap::new(),
                prune_at: MIN_PRUNE_AT,
            }),
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.table.lock().map(|table| table.locks.len()).unwrap_or(0)
    }
}

impl Default for InMemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for InMemoryLockManager {
    type Lock = InMemoryLock;

    fn get_lock(&self, id: &str) -> Result<Arc<InMemoryLock>, LockError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| LockError::Poisoned("lock manager map poisoned".into()))?;

        if !table.locks.contains_key(id) && table.locks.len() >= table.prune_at {
            // Only the map holds an idle entry, and no clone can appear while
            // the map mutex is held.
            table
                .locks
                .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.is_locked());
            table.prune_at = (table.locks.len() * 2).max(MIN_PRUNE_AT);
        }

        Ok(table
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(InMemoryLock::new()))
            .clone())
    }
}
