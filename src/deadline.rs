//! Deadlines and cancellation for potentially blocking store calls.
//!
//! Every locking repository operation has a `*_within` form taking a
//! [`Deadline`]. The deadline is checked while waiting for the per-key lock and
//! again right before a backend transaction commits, so an interrupted call
//! never leaves a partial write behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RepositoryError;

/// Shared flag a caller flips to abandon in-flight operations.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An optional point in time plus an optional cancellation token.
#[derive(Clone, Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// No time limit, not cancellable.
    pub fn never() -> Self {
        Self::default()
    }

    /// Expires `timeout` from now. Overflowing durations mean "never".
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self {
            at: Some(instant),
            cancel: None,
        }
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.at
    }

    /// True when neither a time limit nor a token is attached.
    pub fn is_unbounded(&self) -> bool {
        self.at.is_none() && self.cancel.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.at.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    /// Time left before expiry; `None` when there is no time limit.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with `Cancelled` or `DeadlineExceeded` if the call must stop now.
    pub fn check(&self, operation: &'static str) -> Result<(), RepositoryError> {
        if self.is_cancelled() {
            return Err(RepositoryError::Cancelled(operation));
        }
        if self.is_expired() {
            return Err(RepositoryError::DeadlineExceeded(operation));
        }
        Ok(())
    }
}
