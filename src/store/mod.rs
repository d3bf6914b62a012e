//! Persistence Boundary
//!
//! The engine never talks to a database directly. Everything it needs to
//! persist or read back goes through the [`Store`] trait, implemented by the
//! hosting application. [`MemoryStore`] backs the daemon binary and the test
//! suite.

use crate::disk::{DiskInfo, SmartData};
use crate::error::Result;
use crate::events::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::MemoryStore;

pub type PolicyId = i64;

/// A persisted snapshot policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    pub id: PolicyId,
    pub name: String,
    pub schedule: String,
    pub retention: String,
    pub datasets: Vec<String>,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by a caller creating or replacing a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDraft {
    pub name: String,
    pub schedule: String,
    pub retention: String,
    pub datasets: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyDraft {
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        retention: impl Into<String>,
        datasets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            retention: retention.into(),
            datasets: datasets.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Storage operations the engine depends on. Implementations report
/// failures as [`EngineError::Storage`](crate::error::EngineError::Storage).
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends a published event.
    async fn save_notification(&self, event: &Event) -> Result<()>;

    async fn list_snapshot_policies(&self) -> Result<Vec<SnapshotPolicy>>;

    async fn get_snapshot_policy(&self, id: PolicyId) -> Result<Option<SnapshotPolicy>>;

    /// Stores a new policy and returns it with its assigned id.
    async fn insert_snapshot_policy(&self, draft: &PolicyDraft) -> Result<SnapshotPolicy>;

    async fn update_snapshot_policy(&self, policy: &SnapshotPolicy) -> Result<()>;

    async fn delete_snapshot_policy(&self, id: PolicyId) -> Result<()>;

    async fn update_snapshot_policy_last_run(
        &self,
        id: PolicyId,
        last_run: DateTime<Utc>,
    ) -> Result<()>;

    /// The disk set recorded by the previous disk scan, if any.
    async fn load_disk_baseline(&self) -> Result<Option<Vec<DiskInfo>>>;

    async fn save_disk_baseline(&self, disks: &[DiskInfo]) -> Result<()>;

    async fn save_smart_reading(&self, reading: &SmartData) -> Result<()>;
}
