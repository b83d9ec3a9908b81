//! In-process lock driver.
//!
//! Keeps the slot table in memory. Used for dry runs and as the test double
//! for everything above the ports: it counts calls per capability and can be
//! switched offline or told to fail upcoming writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::LockCode;
use crate::ports::{CodeLister, CodeSetter, PositionDeleter};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryDriver {
    device_id: i64,
    slots: RwLock<BTreeMap<u16, LockCode>>,
    offline: AtomicBool,
    failing_sets: AtomicUsize,
    list_calls: AtomicUsize,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryDriver {
    pub fn new(device_id: i64) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }

    /// A driver pre-populated with `codes`, keyed by their positions.
    pub fn with_codes(device_id: i64, codes: Vec<LockCode>) -> Self {
        let slots = codes.into_iter().map(|c| (c.position, c)).collect();
        Self {
            device_id,
            slots: RwLock::new(slots),
            ..Self::default()
        }
    }

    /// While offline every capability fails with a communication error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `set_code` fail.
    pub fn fail_next_sets(&self, n: usize) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::device(self.device_id, "device offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl CodeLister for MemoryDriver {
    async fn list_codes(&self) -> Result<Vec<LockCode>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        Ok(self.slots.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl CodeSetter for MemoryDriver {
    async fn set_code(&self, code: &str, name: &str, position: u16) -> Result<u16> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let should_fail = self
            .failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::device(self.device_id, "write rejected"));
        }
        self.slots
            .write()
            .await
            .insert(position, LockCode::new(code, name, position));
        Ok(position)
    }
}

#[async_trait]
impl PositionDeleter for MemoryDriver {
    async fn delete_position(&self, position: u16) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        self.slots.write().await.remove(&position);
        Ok(())
    }
}
