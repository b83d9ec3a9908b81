//! Key code data model shared by the engine, the fleet and the reconciler.

use serde::{Deserialize, Serialize};

/// Message returned when a delete finds nothing to remove.
pub const KEY_CODE_NOT_FOUND: &str = "Key code not found";

/// Message returned when a delete removed the user's slot.
pub const KEY_CODE_DELETED: &str = "Key code deleted";

/// Message returned when an update replaced the user's code.
pub const KEY_CODE_UPDATED: &str = "Key code updated";

/// One physical lock known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
}

impl Device {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// An occupied slot on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCode {
    /// Numeric access code, fixed length.
    pub code: String,
    /// Owner of the code.
    pub name: String,
    /// Slot number, `1..=capacity`.
    pub position: u16,
}

impl LockCode {
    pub fn new(code: impl Into<String>, name: impl Into<String>, position: u16) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            position,
        }
    }
}

/// A logical "give `username` the code `code`" request.
///
/// `device_id: None` targets every lock in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeyCodeRequest {
    pub code: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
}

impl CreateKeyCodeRequest {
    pub fn new(code: impl Into<String>, username: impl Into<String>, device_id: Option<i64>) -> Self {
        Self {
            code: code.into(),
            username: username.into(),
            device_id,
        }
    }
}

/// Outcome of a successful create on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeyCodeResult {
    pub position: u16,
    /// Wall-clock allocation time in seconds since the epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteKeyCodeResult {
    pub success: bool,
    pub message: String,
}

impl DeleteKeyCodeResult {
    pub(crate) fn deleted() -> Self {
        Self {
            success: true,
            message: KEY_CODE_DELETED.to_string(),
        }
    }

    pub(crate) fn not_found() -> Self {
        Self {
            success: true,
            message: KEY_CODE_NOT_FOUND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub message: String,
}

impl UpdateResult {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Validate a code against the configured length: exactly `length` ASCII digits.
pub fn validate_code(code: &str, length: usize) -> crate::Result<()> {
    if code.len() != length {
        return Err(crate::Error::Validation(format!(
            "code must be {length} digits, got {} characters",
            code.len()
        )));
    }
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(crate::Error::Validation(
            "code must contain only digits".to_string(),
        ));
    }
    Ok(())
}

/// Validate an owner name: non-empty after trimming.
pub fn validate_username(username: &str) -> crate::Result<()> {
    if username.trim().is_empty() {
        return Err(crate::Error::Validation(
            "username must not be empty".to_string(),
        ));
    }
    Ok(())
}
