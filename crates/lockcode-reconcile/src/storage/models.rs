//! Data models for reconciliation storage.

use serde::{Deserialize, Serialize};

/// Lifecycle of a queued change. Rows move from `Pending` to `Processed`
/// exactly once and are kept afterwards for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Processed,
}

impl PendingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingChange {
    pub id: i64,
    /// Target lock; `None` means every lock in the fleet.
    pub lock_id: Option<i64>,
    pub code: String,
    pub username: String,
    /// Submission time (seconds since epoch, fractional).
    pub timestamp: f64,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedRequest {
    pub id: i64,
    pub request_hash: String,
    pub lock_id: Option<i64>,
    pub code: String,
    pub username: String,
    pub success: bool,
    pub message: String,
    pub processed_at: i64,
}

/// Outcome of applying one pending change, ready to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    pub request_hash: String,
    pub lock_id: Option<i64>,
    pub code: String,
    pub username: String,
    pub success: bool,
    pub message: String,
}
