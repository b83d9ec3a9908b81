//! `LockCode` reconciliation.
//!
//! A persistent queue of key code changes and the processor that applies
//! them to the fleet exactly once, in submission order:
//! - `storage`: `SQLite` queue and processed-request log
//! - `store`: the storage contract the processor depends on
//! - `hash`: content hash identifying a change
//! - `processor`: ordered, deduplicated replay against the fleet

pub mod hash;
pub mod processor;
pub mod storage;
pub mod store;

pub use hash::request_hash;
pub use processor::{ReconcileProcessor, ReconcileReport, RecordOutcome};
pub use storage::{
    DatabaseError, PendingChange, PendingStatus, ProcessedRecord, ProcessedRequest,
    ReconcileDatabase,
};
pub use store::ReconcileStore;
