//! JSON state-file lock driver.
//!
//! Each device is a file of the form `{"codes": [{"code", "name",
//! "position"}]}`. The file is re-read on every listing and rewritten
//! atomically (temp file + rename) on every change. A missing file is an
//! empty device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::LockCode;
use crate::ports::{CodeLister, CodeSetter, PositionDeleter};
use crate::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeviceState {
    #[serde(default)]
    codes: Vec<LockCode>,
}

#[derive(Debug, Clone)]
pub struct FileDriver {
    device_id: i64,
    path: PathBuf,
    timeout: Duration,
}

impl FileDriver {
    pub fn new(device_id: i64, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            device_id,
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::device(self.device_id, format!("timed out after {:?}", self.timeout)))?
    }

    async fn load(&self) -> Result<DeviceState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::device(
                    self.device_id,
                    format!("corrupt state file {}: {e}", self.path.display()),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceState::default()),
            Err(e) => Err(Error::device(self.device_id, e)),
        }
    }

    async fn store(&self, state: &DeviceState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::device(self.device_id, e))?;
            }
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| Error::device(self.device_id, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::device(self.device_id, e))?;
        debug!(device_id = self.device_id, path = %self.path.display(), "Device state written");
        Ok(())
    }

    async fn modify(&self, f: impl FnOnce(&mut DeviceState) + Send) -> Result<()> {
        let mut state = self.load().await?;
        f(&mut state);
        self.store(&state).await
    }
}

#[async_trait]
impl CodeLister for FileDriver {
    async fn list_codes(&self) -> Result<Vec<LockCode>> {
        self.with_timeout(async { Ok(self.load().await?.codes) })
            .await
    }
}

#[async_trait]
impl CodeSetter for FileDriver {
    async fn set_code(&self, code: &str, name: &str, position: u16) -> Result<u16> {
        let entry = LockCode::new(code, name, position);
        self.with_timeout(self.modify(move |state| {
            state.codes.retain(|c| c.position != position);
            state.codes.push(entry);
            state.codes.sort_by_key(|c| c.position);
        }))
        .await?;
        Ok(position)
    }
}

#[async_trait]
impl PositionDeleter for FileDriver {
    async fn delete_position(&self, position: u16) -> Result<()> {
        self.with_timeout(self.modify(move |state| {
            state.codes.retain(|c| c.position != position);
        }))
        .await
    }
}
