//! SQLite storage for the reconciliation queue.
//!
//! Provides persistence for pending key code changes and the append-only
//! log of processed requests.

mod db;
mod models;
mod queries;


pub use db::{DatabaseError, ReconcileDatabase};
pub use models::*;
