//! Device registry.
//!
//! The registry is the only source of truth for which locks exist. It maps a
//! device id to an engine wired to that device's driver, and hands out
//! [`DeviceSession`]s that serialize operations per device.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::drivers::{DriverConfig, DriverFactory};
use crate::engine::{EngineLimits, LockEngine};
use crate::model::Device;
use crate::ports::LockDriver;
use crate::{Error, Result};

/// A configured device: identity plus the driver that reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: i64,
    pub name: String,
    pub driver: DriverConfig,
}

struct RegisteredDevice {
    device: Device,
    driver: Arc<dyn LockDriver>,
    gate: Arc<Mutex<()>>,
}

/// Exclusive access to one device for the lifetime of the value.
///
/// Holding a session blocks every other session for the same device; other
/// devices are unaffected. Dropping it releases the device.
pub struct DeviceSession {
    device: Device,
    engine: LockEngine,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceSession {
    pub const fn device(&self) -> &Device {
        &self.device
    }

    pub const fn engine(&self) -> &LockEngine {
        &self.engine
    }
}

/// Ordered set of known devices.
pub struct DeviceRegistry {
    devices: Vec<RegisteredDevice>,
    limits: EngineLimits,
}

impl DeviceRegistry {
    /// Build the registry from configuration, in configuration order.
    pub fn from_config(
        devices: &[DeviceConfig],
        limits: EngineLimits,
        factory: &dyn DriverFactory,
    ) -> Result<Self> {
        let drivers = devices
            .iter()
            .map(|cfg| {
                debug!(device_id = cfg.id, driver = cfg.driver.as_str(), "Building driver");
                (
                    Device::new(cfg.id, cfg.name.clone()),
                    factory.build(cfg.id, &cfg.driver),
                )
            })
            .collect();
        Self::with_drivers(drivers, limits)
    }

    /// Build the registry from ready-made drivers. Listing order is the
    /// order of `drivers`.
    pub fn with_drivers(
        drivers: Vec<(Device, Arc<dyn LockDriver>)>,
        limits: EngineLimits,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(drivers.len());
        for (device, driver) in drivers {
            if !seen.insert(device.id) {
                return Err(Error::Config(format!("duplicate device id {}", device.id)));
            }
            devices.push(RegisteredDevice {
                device,
                driver,
                gate: Arc::new(Mutex::new(())),
            });
        }
        info!(devices = devices.len(), "Device registry ready");
        Ok(Self { devices, limits })
    }

    pub const fn limits(&self) -> EngineLimits {
        self.limits
    }

    /// Known devices in registry order, optionally restricted to names
    /// containing `filter` (case-insensitive).
    pub fn list_devices(&self, filter: Option<&str>) -> Vec<Device> {
        let needle = filter.map(str::to_lowercase);
        self.devices
            .iter()
            .filter(|d| {
                needle
                    .as_deref()
                    .is_none_or(|n| d.device.name.to_lowercase().contains(n))
            })
            .map(|d| d.device.clone())
            .collect()
    }

    pub fn get_device(&self, device_id: i64) -> Result<Device> {
        Ok(self.find(device_id)?.device.clone())
    }

    /// An engine bound to the device's driver. Cheap; shares no state with
    /// engines for other devices.
    pub fn get_device_engine(&self, device_id: i64) -> Result<LockEngine> {
        let entry = self.find(device_id)?;
        Ok(LockEngine::new(
            device_id,
            Arc::clone(&entry.driver),
            self.limits,
        ))
    }

    /// Wait for exclusive access to the device and return a session for it.
    pub async fn open_session(&self, device_id: i64) -> Result<DeviceSession> {
        let entry = self.find(device_id)?;
        let guard = Arc::clone(&entry.gate).lock_owned().await;
        debug!(device_id, "Device session opened");
        Ok(DeviceSession {
            device: entry.device.clone(),
            engine: LockEngine::new(device_id, Arc::clone(&entry.driver), self.limits),
            _guard: guard,
        })
    }

    fn find(&self, device_id: i64) -> Result<&RegisteredDevice> {
        self.devices
            .iter()
            .find(|d| d.device.id == device_id)
            .ok_or(Error::DeviceNotFound(device_id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::drivers::{DefaultDriverFactory, MemoryDriver};

    fn memory(id: i64, name: &str) -> (Device, Arc<dyn LockDriver>) {
        (Device::new(id, name), Arc::new(MemoryDriver::new(id)))
    }

    fn registry() -> DeviceRegistry {
        DeviceRegistry::with_drivers(
            vec![
                memory(12, "Front Door Lock"),
                memory(3, "Garage Light"),
                memory(7, "Back door LOCK"),
            ],
            EngineLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn lists_in_registration_order() {
        let ids: Vec<i64> = registry().list_devices(None).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![12, 3, 7]);
    }

    #[test]
    fn name_filter_is_case_insensitive() {
        let ids: Vec<i64> = registry()
            .list_devices(Some("lock"))
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![12, 7]);
    }

    #[test]
    fn unknown_device_is_not_found() {
        let err = registry().get_device_engine(99).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(99)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = DeviceRegistry::with_drivers(
            vec![memory(1, "A"), memory(1, "B")],
            EngineLimits::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn builds_from_config() {
        let factory = DefaultDriverFactory {
            io_timeout: Duration::from_secs(1),
        };
        let configs = vec![DeviceConfig {
            id: 5,
            name: "Side Gate Lock".into(),
            driver: DriverConfig::Memory,
        }];
        let registry =
            DeviceRegistry::from_config(&configs, EngineLimits::default(), &factory).unwrap();
        assert_eq!(registry.get_device(5).unwrap().name, "Side Gate Lock");
    }

    #[tokio::test]
    async fn engines_share_the_device_driver() {
        let registry = registry();
        let a = registry.get_device_engine(12).unwrap();
        a.create_key_code("12345678", "Alice").await.unwrap();

        let b = registry.get_device_engine(12).unwrap();
        assert_eq!(b.list_key_codes().await.unwrap().len(), 1);

        let other = registry.get_device_engine(7).unwrap();
        assert!(other.list_key_codes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_serialize_per_device() {
        let registry = Arc::new(registry());
        let first = registry.open_session(12).await.unwrap();

        let contender = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.open_session(12).await.map(|s| s.device().id) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // A different device is not blocked.
        let other = registry.open_session(7).await.unwrap();
        assert_eq!(other.device().id, 7);

        drop(first);
        assert_eq!(contender.await.unwrap().unwrap(), 12);
    }
}
