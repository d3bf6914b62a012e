//! SMART Cache
//!
//! Throttles `smartctl` invocations. Each device has its own slot guarded by
//! an async mutex, so at most one probe per device is in flight and callers
//! racing on the same device wait for the probe already running instead of
//! starting another one.
//!
//! Readers that only want the last reading ([`SmartCache::get`] and
//! [`SmartCache::readings`]) go through a separate snapshot map and never
//! wait on a slot, so a hung `smartctl` cannot stall a metrics refresh.
//!
//! # Freshness
//!
//! An entry is fresh while `now - fetched_at < ttl`. A failed probe leaves
//! the previous entry in place and hands it back to the caller as `stale`.
//! Ages are measured with [`tokio::time::Instant`] so tests can drive them
//! with a paused clock.

use crate::disk::{SmartData, SmartProbe};
use crate::error::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A probe failed; `stale` carries the last good reading, if there was one
#[derive(Debug, Error)]
#[error("SMART probe failed: {error}")]
pub struct ProbeFailure {
    #[source]
    pub error: EngineError,
    pub stale: Option<SmartData>,
}

#[derive(Debug, Clone)]
struct Cached {
    data: SmartData,
    fetched_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<Cached>>>;

pub struct SmartCache {
    probe: Arc<dyn SmartProbe>,
    slots: Mutex<HashMap<String, Slot>>,
    latest: RwLock<HashMap<String, SmartData>>,
}

impl SmartCache {
    pub fn new(probe: Arc<dyn SmartProbe>) -> Self {
        Self {
            probe,
            slots: Mutex::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached reading for `device` if it is younger than `ttl`,
    /// otherwise probes the device and caches the result.
    pub async fn get_or_probe(
        &self,
        cancel: &CancellationToken,
        device: &str,
        ttl: Duration,
    ) -> Result<SmartData, ProbeFailure> {
        let slot = self.slot(device);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < ttl {
                debug!(device, "SMART cache hit");
                return Ok(cached.data.clone());
            }
        }

        match self.probe.probe(cancel, device).await {
            Ok(data) => {
                *entry = Some(Cached {
                    data: data.clone(),
                    fetched_at: Instant::now(),
                });
                self.write_latest()
                    .insert(device.to_string(), data.clone());
                Ok(data)
            }
            Err(error) => Err(ProbeFailure {
                error,
                stale: entry.as_ref().map(|cached| cached.data.clone()),
            }),
        }
    }

    /// The cached reading for `device` regardless of age.
    pub fn get(&self, device: &str) -> Option<SmartData> {
        self.read_latest().get(device).cloned()
    }

    /// Every cached reading, sorted by device path.
    pub fn readings(&self) -> Vec<SmartData> {
        let mut readings: Vec<SmartData> = self.read_latest().values().cloned().collect();
        readings.sort_by(|a, b| a.device.cmp(&b.device));
        readings
    }

    /// Drops the entry for a device that is gone.
    pub fn forget(&self, device: &str) {
        self.lock_slots().remove(device);
        self.write_latest().remove(device);
    }

    fn slot(&self, device: &str) -> Slot {
        self.lock_slots()
            .entry(device.to_string())
            .or_default()
            .clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_latest(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SmartData>> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_latest(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SmartData>> {
        self.latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
