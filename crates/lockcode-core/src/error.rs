//! Error types for `LockCode` core library.

use thiserror::Error;

/// Result type alias using `LockCode` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `LockCode` operations.
///
/// Validation and duplicate errors are raised before any device write, so
/// they never leave a device in a modified state.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request (code not all digits, wrong length, empty username)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested code is already stored on the device
    #[error("Key code {code} already exists on device {device_id}")]
    DuplicateCode { device_id: i64, code: String },

    /// The owner already holds a code on the device
    #[error("User {username} already has a key code on device {device_id}")]
    DuplicateOwner { device_id: i64, username: String },

    /// Every slot between 1 and capacity is occupied
    #[error("No free slot on device {device_id} (capacity {capacity})")]
    CapacityExhausted { device_id: i64, capacity: u16 },

    /// The registry has no device with this id
    #[error("Device {0} not found")]
    DeviceNotFound(i64),

    /// Capability port I/O failure
    #[error("Device {device_id} communication error: {message}")]
    DeviceCommunication { device_id: i64, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::DeviceCommunication`] from any displayable cause.
    pub fn device(device_id: i64, cause: impl std::fmt::Display) -> Self {
        Self::DeviceCommunication {
            device_id,
            message: cause.to_string(),
        }
    }

    /// Whether the error was raised by a pre-write check, meaning the device
    /// was left untouched.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::DuplicateCode { .. }
                | Self::DuplicateOwner { .. }
                | Self::CapacityExhausted { .. }
        )
    }
}
