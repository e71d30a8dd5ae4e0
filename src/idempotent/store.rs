use crate::deadline::Deadline;
use crate::error::RepositoryError;

/// "Have I processed this message id before?"
///
/// Ids are derived by the caller (a file path, a header value) and are opaque
/// here. Storage failures are errors, never "not a duplicate".
pub trait IdempotentRepository: Send + Sync {
    /// Record `message_id`. Returns `true` if it was not recorded before.
    ///
    /// Concurrent calls with the same id yield exactly one `true`.
    fn add_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError>;

    /// Membership check without side effects.
    fn contains_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError>;

    /// Forget `message_id`. Returns whether it was recorded.
    fn remove_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError>;

    /// Mark `message_id` durably committed. Returns `true` if it is recorded
    /// (confirming twice is fine), `false` if there is nothing to confirm.
    fn confirm_within(&self, message_id: &str, deadline: &Deadline) -> Result<bool, RepositoryError>;

    /// Forget every id.
    fn clear(&self) -> Result<(), RepositoryError>;

    fn add(&self, message_id: &str) -> Result<bool, RepositoryError> {
        self.add_within(message_id, &Deadline::never())
    }

    fn contains(&self, message_id: &str) -> Result<bool, RepositoryError> {
        self.contains_within(message_id, &Deadline::never())
    }

    fn remove(&self, message_id: &str) -> Result<bool, RepositoryError> {
        self.remove_within(message_id, &Deadline::never())
    }

    fn confirm(&self, message_id: &str) -> Result<bool, RepositoryError> {
        self.confirm_within(message_id, &Deadline::never())
    }
}
