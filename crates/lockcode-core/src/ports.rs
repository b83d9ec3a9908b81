//! Capability ports a lock driver implements.
//!
//! The engine only ever talks to a device through these three traits. A
//! driver (in-memory, file-backed, a vendor API, browser automation, ...)
//! implements all three and is then usable as a [`LockDriver`].
//!
//! Implementations apply their own I/O timeouts and report failures as
//! [`Error::DeviceCommunication`](crate::Error::DeviceCommunication). The
//! engine never retries.

use async_trait::async_trait;

use crate::Result;
use crate::model::LockCode;

/// Reads the codes currently stored on a device.
#[async_trait]
pub trait CodeLister: Send + Sync {
    /// Live device state at call time. Order is driver-defined.
    async fn list_codes(&self) -> Result<Vec<LockCode>>;
}

/// Writes a code into a slot.
///
/// Drivers do not allocate. The engine chooses the slot (see
/// [`LockEngine::next_position`](crate::LockEngine::next_position)) and
/// passes it in.
#[async_trait]
pub trait CodeSetter: Send + Sync {
    /// Store `code` for `name` at `position` (already chosen by the caller).
    ///
    /// Returns the position the device actually used.
    async fn set_code(&self, code: &str, name: &str, position: u16) -> Result<u16>;
}

/// Clears a slot.
#[async_trait]
pub trait PositionDeleter: Send + Sync {
    /// Delete whatever occupies `position`. Deleting an empty slot is a no-op.
    async fn delete_position(&self, position: u16) -> Result<()>;
}

/// A complete lock driver: all three capabilities.
pub trait LockDriver: CodeLister + CodeSetter + PositionDeleter {}

impl<T> LockDriver for T where T: CodeLister + CodeSetter + PositionDeleter {}
