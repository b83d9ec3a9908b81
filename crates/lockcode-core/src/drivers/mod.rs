//! Bundled lock drivers and the factory that builds them from configuration.

mod file;
mod memory;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use file::FileDriver;
pub use memory::MemoryDriver;

use crate::ports::LockDriver;

/// Which driver backs a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// In-process slot table, lost on exit.
    Memory,
    /// JSON state file at `path`.
    File { path: std::path::PathBuf },
}

impl DriverConfig {
    /// Canonical lowercase driver name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File { .. } => "file",
        }
    }
}

/// Builds a driver instance for a device.
pub trait DriverFactory: Send + Sync {
    fn build(&self, device_id: i64, config: &DriverConfig) -> Arc<dyn LockDriver>;
}

/// Factory for the drivers shipped with this crate.
#[derive(Debug, Clone, Copy)]
pub struct DefaultDriverFactory {
    pub io_timeout: Duration,
}

impl DriverFactory for DefaultDriverFactory {
    fn build(&self, device_id: i64, config: &DriverConfig) -> Arc<dyn LockDriver> {
        match config {
            DriverConfig::Memory => Arc::new(MemoryDriver::new(device_id)),
            DriverConfig::File { path } => {
                Arc::new(FileDriver::new(device_id, path.clone(), self.io_timeout))
            }
        }
    }
}
