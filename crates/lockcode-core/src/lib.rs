//! `LockCode` Core Library
//!
//! Key code management for electronic door locks:
//! - Capability ports a lock driver implements
//! - Generic lock engine enforcing code/owner uniqueness and slot capacity
//! - Highest-free-slot allocator
//! - Device registry and fleet-wide fan-out
//! - Configuration, clock helpers, tracing setup

pub mod allocator;
pub mod clock;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod model;
pub mod ports;
pub mod registry;
pub mod tracing_init;

pub use config::Config;
pub use engine::{EngineLimits, LockEngine};
pub use error::{Error, Result};
pub use fleet::{DeviceOutcome, FleetController, FleetResults};
pub use model::{
    CreateKeyCodeRequest, CreateKeyCodeResult, DeleteKeyCodeResult, Device, LockCode, UpdateResult,
};
pub use ports::{CodeLister, CodeSetter, LockDriver, PositionDeleter};
pub use registry::{DeviceConfig, DeviceRegistry, DeviceSession};
