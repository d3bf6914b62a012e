//! In-memory [`Store`] implementation.
//!
//! Used by the daemon when no external database is wired in and by the test
//! suite. Writes can be made to fail on demand to exercise the engine's
//! persistence-failure paths.
//!
//! Notifications are kept in a bounded ring: once it holds
//! `notification_capacity` events, each new one evicts the oldest.

use super::{PolicyDraft, PolicyId, SnapshotPolicy, Store};
use crate::disk::{DiskInfo, SmartData};
use crate::error::{EngineError, Result};
use crate::events::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

/// Notifications retained by [`MemoryStore::new`].
pub const DEFAULT_RETAINED_NOTIFICATIONS: usize = 10_000;

pub struct MemoryStore {
    notifications: RwLock<VecDeque<Event>>,
    notification_capacity: usize,
    policies: RwLock<BTreeMap<PolicyId, SnapshotPolicy>>,
    disk_baseline: RwLock<Option<Vec<DiskInfo>>>,
    smart_readings: RwLock<HashMap<String, SmartData>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_notification_capacity(DEFAULT_RETAINED_NOTIFICATIONS)
    }

    /// A store that keeps at most `capacity` notifications (at least one).
    pub fn with_notification_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            notifications: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            notification_capacity: capacity,
            policies: RwLock::new(BTreeMap::new()),
            disk_baseline: RwLock::new(None),
            smart_readings: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail with a storage error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Retained notifications, oldest first.
    pub async fn notifications(&self) -> Vec<Event> {
        self.notifications.read().await.iter().cloned().collect()
    }

    pub async fn smart_reading(&self, device: &str) -> Option<SmartData> {
        self.smart_readings.read().await.get(device).cloned()
    }

    pub async fn disk_baseline(&self) -> Option<Vec<DiskInfo>> {
        self.disk_baseline.read().await.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(EngineError::Storage("store is unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_notification(&self, event: &Event) -> Result<()> {
        self.check_writable()?;
        let mut notifications = self.notifications.write().await;
        while notifications.len() >= self.notification_capacity {
            notifications.pop_front();
        }
        notifications.push_back(event.clone());
        Ok(())
    }

    async fn list_snapshot_policies(&self) -> Result<Vec<SnapshotPolicy>> {
        Ok(self.policies.read().await.values().cloned().collect())
    }

    async fn get_snapshot_policy(&self, id: PolicyId) -> Result<Option<SnapshotPolicy>> {
        Ok(self.policies.read().await.get(&id).cloned())
    }

    async fn insert_snapshot_policy(&self, draft: &PolicyDraft) -> Result<SnapshotPolicy> {
        self.check_writable()?;
        let mut policies = self.policies.write().await;
        if policies.values().any(|p| p.name == draft.name) {
            return Err(EngineError::AlreadyExists(format!(
                "snapshot policy {}",
                draft.name
            )));
        }

        let now = Utc::now();
        let policy = SnapshotPolicy {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: draft.name.clone(),
            schedule: draft.schedule.clone(),
            retention: draft.retention.clone(),
            datasets: draft.datasets.clone(),
            enabled: draft.enabled,
            last_run: None,
            created_at: now,
            updated_at: now,
        };
        policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn update_snapshot_policy(&self, policy: &SnapshotPolicy) -> Result<()> {
        self.check_writable()?;
        let mut policies = self.policies.write().await;
        if policies
            .values()
            .any(|p| p.id != policy.id && p.name == policy.name)
        {
            return Err(EngineError::AlreadyExists(format!(
                "snapshot policy {}",
                policy.name
            )));
        }
        match policies.get_mut(&policy.id) {
            Some(existing) => {
                *existing = policy.clone();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("snapshot policy {}", policy.id))),
        }
    }

    async fn delete_snapshot_policy(&self, id: PolicyId) -> Result<()> {
        self.check_writable()?;
        match self.policies.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(format!("snapshot policy {id}"))),
        }
    }

    async fn update_snapshot_policy_last_run(
        &self,
        id: PolicyId,
        last_run: DateTime<Utc>,
    ) -> Result<()> {
        self.check_writable()?;
        match self.policies.write().await.get_mut(&id) {
            Some(policy) => {
                policy.last_run = Some(last_run);
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("snapshot policy {id}"))),
        }
    }

    async fn load_disk_baseline(&self) -> Result<Option<Vec<DiskInfo>>> {
        Ok(self.disk_baseline.read().await.clone())
    }

    async fn save_disk_baseline(&self, disks: &[DiskInfo]) -> Result<()> {
        self.check_writable()?;
        *self.disk_baseline.write().await = Some(disks.to_vec());
        Ok(())
    }

    async fn save_smart_reading(&self, reading: &SmartData) -> Result<()> {
        self.check_writable()?;
        self.smart_readings
            .write()
            .await
            .insert(reading.device.clone(), reading.clone());
        Ok(())
    }
}
