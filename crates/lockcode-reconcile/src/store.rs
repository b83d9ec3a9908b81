//! Storage contract consumed by the reconciliation processor.

use async_trait::async_trait;

use crate::storage::{DatabaseError, PendingChange, ProcessedRecord};

/// The four queue operations the processor depends on.
///
/// `record_processed` must be safe against concurrent duplicates: for a
/// given `request_hash` at most one record is ever stored, and the call
/// reports whether this one was it.
#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// All pending changes, ordered by timestamp ascending (ties by
    /// insertion order).
    async fn fetch_pending(&self) -> Result<Vec<PendingChange>, DatabaseError>;

    /// Whether an outcome with this hash has already been recorded.
    async fn is_processed(&self, request_hash: &str) -> Result<bool, DatabaseError>;

    /// Append an outcome. Returns `false` if the hash was already present.
    async fn record_processed(&self, record: &ProcessedRecord) -> Result<bool, DatabaseError>;

    /// Flag a pending change as processed. The row is kept.
    async fn mark_processed(&self, pending_id: i64) -> Result<(), DatabaseError>;
}
