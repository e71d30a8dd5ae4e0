use crate::deadline::Deadline;
use crate::error::RepositoryError;

use super::AggregationRecord;

/// Storage for in-progress aggregations plus a completed log.
///
/// The store never merges records and never decides completion. A caller
/// composes the primitives: `add` the merged record, decide completion, then
/// `remove` + `confirm` (or `complete`, which does both atomically), then emit.
pub trait AggregationRepository: Send + Sync {
    /// Current record for `key`.
    fn get_within(
        &self,
        key: &str,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError>;

    /// Store `record` under `key`, returning the record it replaced.
    ///
    /// Calls on the same key are serialized; none is lost.
    fn add_within(
        &self,
        key: &str,
        record: &AggregationRecord,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError>;

    /// Delete the active record. Returns whether one existed.
    fn remove_within(&self, key: &str, deadline: &Deadline) -> Result<bool, RepositoryError>;

    /// Append a completed record for `key` to the completed log.
    ///
    /// Uses `record` if given, else the active record, else does nothing.
    /// Returns whether an entry was appended. Confirming the active record
    /// again with no `add` in between appends nothing; an explicit `record`
    /// is always appended.
    fn confirm_within(
        &self,
        key: &str,
        record: Option<&AggregationRecord>,
        deadline: &Deadline,
    ) -> Result<bool, RepositoryError>;

    /// Remove the active record and log `record` as completed in one transaction.
    ///
    /// Always appends, even if an earlier round logged the same content.
    fn complete_within(
        &self,
        key: &str,
        record: &AggregationRecord,
        deadline: &Deadline,
    ) -> Result<(), RepositoryError>;

    /// Latest completed record for `key`, for resuming after a restart.
    fn recover_within(
        &self,
        key: &str,
        deadline: &Deadline,
    ) -> Result<Option<AggregationRecord>, RepositoryError>;

    /// Correlation keys with an active record.
    fn keys(&self) -> Result<Vec<String>, RepositoryError>;

    /// Correlation keys present in the completed log.
    fn scan(&self) -> Result<Vec<String>, RepositoryError>;

    fn get(&self, key: &str) -> Result<Option<AggregationRecord>, RepositoryError> {
        self.get_within(key, &Deadline::never())
    }

    fn add(
        &self,
        key: &str,
        record: &AggregationRecord,
    ) -> Result<Option<AggregationRecord>, RepositoryError> {
        self.add_within(key, record, &Deadline::never())
    }

    fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        self.remove_within(key, &Deadline::never())
    }

    fn confirm(&self, key: &str, record: Option<&AggregationRecord>) -> Result<bool, RepositoryError> {
        self.confirm_within(key, record, &Deadline::never())
    }

    fn complete(&self, key: &str, record: &AggregationRecord) -> Result<(), RepositoryError> {
        self.complete_within(key, record, &Deadline::never())
    }

    fn recover(&self, key: &str) -> Result<Option<AggregationRecord>, RepositoryError> {
        self.recover_within(key, &Deadline::never())
    }
}
