//! Generic lock engine.
//!
//! Implements key code create/delete/list/update against the capability
//! ports of one device. Every operation re-reads the device: codes may be
//! changed at the keypad, so nothing is cached between calls.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allocator::{self, DEFAULT_CAPACITY};
use crate::clock::unix_timestamp;
use crate::model::{
    self, CreateKeyCodeResult, DeleteKeyCodeResult, KEY_CODE_UPDATED, LockCode, UpdateResult,
};
use crate::ports::LockDriver;
use crate::{Error, Result};

/// Default length of a key code, in digits.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Per-device engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Number of slots on the device.
    pub capacity: u16,
    /// Required number of digits in a code.
    pub code_length: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            code_length: DEFAULT_CODE_LENGTH,
        }
    }
}

/// Key code engine bound to a single device's driver.
#[derive(Clone)]
pub struct LockEngine {
    device_id: i64,
    driver: Arc<dyn LockDriver>,
    limits: EngineLimits,
}

impl std::fmt::Debug for LockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockEngine")
            .field("device_id", &self.device_id)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl LockEngine {
    pub fn new(device_id: i64, driver: Arc<dyn LockDriver>, limits: EngineLimits) -> Self {
        Self {
            device_id,
            driver,
            limits,
        }
    }

    pub const fn device_id(&self) -> i64 {
        self.device_id
    }

    pub const fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Current codes on the device, as reported by the driver.
    pub async fn list_key_codes(&self) -> Result<Vec<LockCode>> {
        self.driver.list_codes().await
    }

    /// The slot the next create would use.
    pub async fn next_position(&self) -> Result<u16> {
        let codes = self.driver.list_codes().await?;
        self.allocate(&codes)
    }

    /// Store `code` for `username` in the highest free slot.
    ///
    /// Checks run in a fixed order against a fresh listing: code format,
    /// code collision, owner collision, capacity. Nothing is written unless
    /// all of them pass.
    pub async fn create_key_code(&self, code: &str, username: &str) -> Result<CreateKeyCodeResult> {
        model::validate_code(code, self.limits.code_length)?;
        model::validate_username(username)?;

        let codes = self.driver.list_codes().await?;
        self.check_conflicts(&codes, code, username)?;
        let position = self.allocate(&codes)?;

        let timestamp = unix_timestamp();
        let position = self.driver.set_code(code, username, position).await?;

        info!(
            device_id = self.device_id,
            position,
            username,
            "Key code created"
        );
        Ok(CreateKeyCodeResult {
            position,
            timestamp,
        })
    }

    /// Remove the slot held by `username`.
    ///
    /// A user without a code is not an error: the result reports
    /// "Key code not found" and no delete is issued.
    pub async fn delete_key_code(&self, username: &str) -> Result<DeleteKeyCodeResult> {
        let codes = self.driver.list_codes().await?;
        let Some(entry) = codes.iter().find(|c| c.name == username) else {
            debug!(device_id = self.device_id, username, "No key code to delete");
            return Ok(DeleteKeyCodeResult::not_found());
        };

        self.driver.delete_position(entry.position).await?;
        info!(
            device_id = self.device_id,
            position = entry.position,
            username,
            "Key code deleted"
        );
        Ok(DeleteKeyCodeResult::deleted())
    }

    /// Replace `username`'s code with `new_code`.
    ///
    /// Runs as delete followed by create. When the create step fails the
    /// previous code is written back to its old slot, and the returned
    /// result carries `success: false` with both the failure and the
    /// outcome of the restore. Errors raised before the delete (validation,
    /// device unreachable) are returned as `Err`.
    pub async fn update_key_code(&self, username: &str, new_code: &str) -> Result<UpdateResult> {
        model::validate_code(new_code, self.limits.code_length)?;
        model::validate_username(username)?;

        let codes = self.driver.list_codes().await?;
        let previous = codes.iter().find(|c| c.name == username).cloned();

        if let Some(prev) = &previous {
            if prev.code == new_code {
                return Ok(UpdateResult::ok(KEY_CODE_UPDATED));
            }
            // Another owner's code would make the create fail after the delete.
            if let Some(other) = codes.iter().find(|c| c.code == new_code) {
                return Err(Error::DuplicateCode {
                    device_id: self.device_id,
                    code: other.code.clone(),
                });
            }
            self.driver.delete_position(prev.position).await?;
        }

        match self.create_key_code(new_code, username).await {
            Ok(created) => {
                info!(
                    device_id = self.device_id,
                    position = created.position,
                    username,
                    "Key code updated"
                );
                Ok(UpdateResult::ok(KEY_CODE_UPDATED))
            }
            Err(e) => {
                let Some(prev) = previous else {
                    return Err(e);
                };
                Ok(self.restore(&prev, &e).await)
            }
        }
    }

    async fn restore(&self, previous: &LockCode, cause: &Error) -> UpdateResult {
        warn!(
            device_id = self.device_id,
            username = %previous.name,
            error = %cause,
            "Update failed after delete, restoring previous code"
        );
        match self
            .driver
            .set_code(&previous.code, &previous.name, previous.position)
            .await
        {
            Ok(_) => UpdateResult::failed(format!("Update failed: {cause}; previous code restored")),
            Err(restore_err) => {
                warn!(
                    device_id = self.device_id,
                    username = %previous.name,
                    error = %restore_err,
                    "Failed to restore previous code"
                );
                UpdateResult::failed(format!(
                    "Update failed: {cause}; previous code could not be restored: {restore_err}"
                ))
            }
        }
    }

    fn check_conflicts(&self, codes: &[LockCode], code: &str, username: &str) -> Result<()> {
        if codes.iter().any(|c| c.code == code) {
            return Err(Error::DuplicateCode {
                device_id: self.device_id,
                code: code.to_string(),
            });
        }
        if codes.iter().any(|c| c.name == username) {
            return Err(Error::DuplicateOwner {
                device_id: self.device_id,
                username: username.to_string(),
            });
        }
        Ok(())
    }

    fn allocate(&self, codes: &[LockCode]) -> Result<u16> {
        let occupied: HashSet<u16> = codes.iter().map(|c| c.position).collect();
        allocator::allocate(&occupied, self.limits.capacity).map_err(|e| {
            Error::CapacityExhausted {
                device_id: self.device_id,
                capacity: e.capacity,
            }
        })
    }
}
