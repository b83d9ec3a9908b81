//! Database queries for the reconciliation queue.

use async_trait::async_trait;
use lockcode_core::clock::unix_timestamp;

use super::db::{DatabaseError, ReconcileDatabase};
use super::models::{PendingChange, PendingStatus, ProcessedRecord, ProcessedRequest};
use crate::store::ReconcileStore;

impl ReconcileDatabase {
    // =========================================================================
    // Pending change queries
    // =========================================================================

    /// Queue a change. This is the producer side of the queue.
    pub async fn enqueue_pending(
        &self,
        lock_id: Option<i64>,
        code: &str,
        username: &str,
        timestamp: f64,
    ) -> Result<PendingChange, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO pending_changes (lock_id, code, username, timestamp, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(lock_id)
        .bind(code)
        .bind(username)
        .bind(timestamp)
        .bind(PendingStatus::Pending.as_str())
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_pending(result.last_insert_rowid()).await
    }

    /// Get a pending change by ID, whatever its status.
    pub async fn get_pending(&self, id: i64) -> Result<PendingChange, DatabaseError> {
        sqlx::query_as::<_, PendingChange>("SELECT * FROM pending_changes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pending change {id}")))
    }

    /// Number of changes still waiting.
    pub async fn count_pending(&self) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM pending_changes WHERE status = ?")
            .bind(PendingStatus::Pending.as_str())
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Processed request queries
    // =========================================================================

    /// Most recent processed requests first.
    pub async fn list_processed(&self, limit: u32) -> Result<Vec<ProcessedRequest>, DatabaseError> {
        let rows = sqlx::query_as::<_, ProcessedRequest>(
            "SELECT * FROM processed_requests ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Look up a processed request by its hash.
    pub async fn get_processed(
        &self,
        request_hash: &str,
    ) -> Result<Option<ProcessedRequest>, DatabaseError> {
        let row = sqlx::query_as::<_, ProcessedRequest>(
            "SELECT * FROM processed_requests WHERE request_hash = ?",
        )
        .bind(request_hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl ReconcileStore for ReconcileDatabase {
    async fn fetch_pending(&self) -> Result<Vec<PendingChange>, DatabaseError> {
        let rows = sqlx::query_as::<_, PendingChange>(
            "SELECT * FROM pending_changes WHERE status = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(PendingStatus::Pending.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn is_processed(&self, request_hash: &str) -> Result<bool, DatabaseError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM processed_requests WHERE request_hash = ?")
                .bind(request_hash)
                .fetch_optional(self.pool())
                .await?;
        Ok(found.is_some())
    }

    async fn record_processed(&self, record: &ProcessedRecord) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO processed_requests (request_hash, lock_id, code, username, success, message, processed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT(request_hash) DO NOTHING",
        )
        .bind(&record.request_hash)
        .bind(record.lock_id)
        .bind(&record.code)
        .bind(&record.username)
        .bind(record.success)
        .bind(&record.message)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_processed(&self, pending_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE pending_changes SET status = ? WHERE id = ?")
            .bind(PendingStatus::Processed.as_str())
            .bind(pending_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Pending change {pending_id}")));
        }
        Ok(())
    }
}
