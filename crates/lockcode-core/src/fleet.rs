//! Fleet controller.
//!
//! Routes a logical key code operation to one device or fans it out across
//! the fleet. Fan-out visits devices in registry order and yields one
//! [`DeviceOutcome`] per device; a failing device is reported in its own
//! outcome and does not stop the devices after it. Nothing is rolled back.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Result;
use crate::model::{
    CreateKeyCodeRequest, CreateKeyCodeResult, DeleteKeyCodeResult, Device, LockCode, UpdateResult,
};
use crate::registry::{DeviceRegistry, DeviceSession};

/// Result of an operation on one device of a fan-out.
#[derive(Debug)]
pub struct DeviceOutcome<T> {
    pub device: Device,
    pub result: Result<T>,
}

impl<T> DeviceOutcome<T> {
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Lazily evaluated per-device results.
///
/// Nothing touches a device until the stream is polled; each poll runs the
/// operation on the next device. The stream is finite (one item per
/// targeted device) and cannot be restarted once consumed.
pub struct FleetResults<T> {
    inner: Pin<Box<dyn Stream<Item = DeviceOutcome<T>> + Send>>,
}

impl<T> FleetResults<T> {
    fn new(stream: impl Stream<Item = DeviceOutcome<T>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Drive the stream to completion.
    pub async fn collect_outcomes(self) -> Vec<DeviceOutcome<T>> {
        self.collect().await
    }
}

impl<T> Stream for FleetResults<T> {
    type Item = DeviceOutcome<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> std::fmt::Debug for FleetResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetResults").finish_non_exhaustive()
    }
}

/// Entry point for key code operations against the fleet.
#[derive(Clone)]
pub struct FleetController {
    registry: Arc<DeviceRegistry>,
    lock_filter: Option<String>,
}

impl FleetController {
    pub const fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            lock_filter: None,
        }
    }

    /// Restrict "all devices" fan-out to devices whose name contains
    /// `filter` (case-insensitive).
    #[must_use]
    pub fn with_lock_filter(mut self, filter: Option<String>) -> Self {
        self.lock_filter = filter;
        self
    }

    pub const fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn list_devices(&self, filter: Option<&str>) -> Vec<Device> {
        self.registry.list_devices(filter)
    }

    /// Devices targeted when a request names no device.
    pub fn fleet_targets(&self) -> Vec<Device> {
        self.registry.list_devices(self.lock_filter.as_deref())
    }

    pub async fn list_key_codes(&self, device_id: i64) -> Result<Vec<LockCode>> {
        let session = self.registry.open_session(device_id).await?;
        session.engine().list_key_codes().await
    }

    pub async fn next_position(&self, device_id: i64) -> Result<u16> {
        let session = self.registry.open_session(device_id).await?;
        session.engine().next_position().await
    }

    /// Create the code on the requested device, or on every fleet target
    /// when `request.device_id` is `None`.
    ///
    /// Fails up front only if a named device is unknown; every per-device
    /// error is delivered through the returned stream.
    pub fn create_key_code(
        &self,
        request: CreateKeyCodeRequest,
    ) -> Result<FleetResults<CreateKeyCodeResult>> {
        let devices = match request.device_id {
            Some(id) => vec![self.registry.get_device(id)?],
            None => self.fleet_targets(),
        };
        let CreateKeyCodeRequest { code, username, .. } = request;
        Ok(self.fan_out(devices, "create", move |session| {
            let code = code.clone();
            let username = username.clone();
            async move { session.engine().create_key_code(&code, &username).await }
        }))
    }

    pub async fn delete_key_code(
        &self,
        username: &str,
        device_id: i64,
    ) -> Result<DeleteKeyCodeResult> {
        let session = self.registry.open_session(device_id).await?;
        session.engine().delete_key_code(username).await
    }

    pub fn delete_key_code_on_all_devices(
        &self,
        username: &str,
    ) -> FleetResults<DeleteKeyCodeResult> {
        let username = username.to_string();
        self.fan_out(self.fleet_targets(), "delete", move |session| {
            let username = username.clone();
            async move { session.engine().delete_key_code(&username).await }
        })
    }

    /// First code on the device owned by `username`, or equal to `code`
    /// when one is given.
    pub async fn get_key_code(
        &self,
        username: &str,
        device_id: i64,
        code: Option<&str>,
    ) -> Result<Option<LockCode>> {
        let codes = self.list_key_codes(device_id).await?;
        Ok(codes
            .into_iter()
            .find(|c| c.name == username || code.is_some_and(|code| c.code == code)))
    }

    pub async fn update_key_code(
        &self,
        device_id: i64,
        username: &str,
        new_code: &str,
    ) -> Result<UpdateResult> {
        let session = self.registry.open_session(device_id).await?;
        session.engine().update_key_code(username, new_code).await
    }

    fn fan_out<T, F, Fut>(&self, devices: Vec<Device>, action: &'static str, op: F) -> FleetResults<T>
    where
        T: Send + 'static,
        F: Fn(DeviceSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        FleetResults::new(async_stream::stream! {
            for device in devices {
                let result = match registry.open_session(device.id).await {
                    Ok(session) => op(session).await,
                    Err(e) => Err(e),
                };
                match &result {
                    Ok(_) => info!(device_id = device.id, action, "Fleet operation succeeded"),
                    Err(e) => warn!(device_id = device.id, action, error = %e, "Fleet operation failed"),
                }
                yield DeviceOutcome { device, result };
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::drivers::MemoryDriver;
    use crate::engine::EngineLimits;
    use crate::ports::{CodeLister, LockDriver};

    struct Fleet {
        controller: FleetController,
        drivers: Vec<Arc<MemoryDriver>>,
    }

    fn fleet(names: &[&str]) -> Fleet {
        let drivers: Vec<Arc<MemoryDriver>> = (1..=names.len())
            .map(|i| Arc::new(MemoryDriver::new(i64::try_from(i).unwrap())))
            .collect();
        let entries = names
            .iter()
            .zip(&drivers)
            .enumerate()
            .map(|(i, (name, driver))| {
                (
                    Device::new(i64::try_from(i + 1).unwrap(), *name),
                    Arc::clone(driver) as Arc<dyn LockDriver>,
                )
            })
            .collect();
        let registry = DeviceRegistry::with_drivers(entries, EngineLimits::default()).unwrap();
        Fleet {
            controller: FleetController::new(Arc::new(registry)),
            drivers,
        }
    }

    #[tokio::test]
    async fn single_device_create_yields_one_result() {
        let f = fleet(&["Front Lock", "Back Lock"]);
        let outcomes = f
            .controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(2)))
            .unwrap()
            .collect_outcomes()
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].device.id, 2);
        assert_eq!(outcomes[0].result.as_ref().unwrap().position, 250);
        assert!(f.drivers[0].list_codes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_device_fails_up_front() {
        let f = fleet(&["Front Lock"]);
        let err = f
            .controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(9)))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(9)));
    }

    #[tokio::test]
    async fn fan_out_isolates_failing_device() {
        let f = fleet(&["Lock A", "Lock B", "Lock C"]);
        f.drivers[1].set_offline(true);

        let outcomes = f
            .controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", None))
            .unwrap()
            .collect_outcomes()
            .await;

        let ids: Vec<i64> = outcomes.iter().map(|o| o.device.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[1].result,
            Err(Error::DeviceCommunication { device_id: 2, .. })
        ));
        assert!(outcomes[2].is_success());
    }

    #[tokio::test]
    async fn fan_out_is_lazy() {
        let f = fleet(&["Lock A", "Lock B"]);
        let mut results = f
            .controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", None))
            .unwrap();
        assert_eq!(f.drivers[0].set_calls(), 0);

        let first = results.next().await.unwrap();
        assert!(first.is_success());
        assert_eq!(f.drivers[0].set_calls(), 1);
        assert_eq!(f.drivers[1].set_calls(), 0);

        assert!(results.next().await.is_some());
        assert!(results.next().await.is_none());
    }

    #[tokio::test]
    async fn lock_filter_limits_fan_out() {
        let f = fleet(&["Front Lock", "Porch Light", "Back lock"]);
        let controller = f.controller.clone().with_lock_filter(Some("LOCK".into()));

        let outcomes = controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", None))
            .unwrap()
            .collect_outcomes()
            .await;
        let ids: Vec<i64> = outcomes.iter().map(|o| o.device.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(f.drivers[1].set_calls(), 0);
    }

    #[tokio::test]
    async fn delete_on_all_devices_reports_each() {
        let f = fleet(&["Lock A", "Lock B"]);
        f.controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(1)))
            .unwrap()
            .collect_outcomes()
            .await;

        let outcomes = f
            .controller
            .delete_key_code_on_all_devices("Alice")
            .collect_outcomes()
            .await;
        let messages: Vec<&str> = outcomes
            .iter()
            .map(|o| o.result.as_ref().unwrap().message.as_str())
            .collect();
        assert_eq!(messages, vec!["Key code deleted", "Key code not found"]);
    }

    #[tokio::test]
    async fn get_key_code_matches_name_or_code() {
        let f = fleet(&["Lock A"]);
        f.controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(1)))
            .unwrap()
            .collect_outcomes()
            .await;

        let by_name = f.controller.get_key_code("Alice", 1, None).await.unwrap();
        assert_eq!(by_name.unwrap().code, "12345678");

        let by_code = f
            .controller
            .get_key_code("Someone", 1, Some("12345678"))
            .await
            .unwrap();
        assert_eq!(by_code.unwrap().name, "Alice");

        assert!(f.controller.get_key_code("Bob", 1, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_replaces_code_on_device() {
        let f = fleet(&["Lock A"]);
        f.controller
            .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(1)))
            .unwrap()
            .collect_outcomes()
            .await;

        let result = f
            .controller
            .update_key_code(1, "Alice", "87654321")
            .await
            .unwrap();
        assert!(result.success);

        let codes = f.controller.list_key_codes(1).await.unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "87654321");
    }
}
