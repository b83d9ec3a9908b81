//! `LockCode` CLI Library
//!
//! Command-line interface for managing key codes across a fleet of locks,
//! directly or through the reconciliation queue.

pub mod context;
pub mod key_cmd;
pub mod queue_cmd;
