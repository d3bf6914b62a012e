//! Snapshot policy CRUD.
//!
//! Every write is validated before it reaches the store, so the scheduler's
//! working set only ever contains policies it can parse. Each accepted
//! change triggers a scheduler reload.

use crate::error::{EngineError, Result};
use crate::scheduler::{Retention, Schedule, Scheduler};
use crate::store::{PolicyDraft, PolicyId, SnapshotPolicy, Store};
use chrono::Utc;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{error, info};

static POLICY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid regex"));

pub fn is_valid_policy_name(name: &str) -> bool {
    POLICY_NAME.is_match(name)
}

/// Checks a draft and returns it with datasets trimmed and de-duplicated.
pub fn validate_draft(draft: &PolicyDraft) -> Result<PolicyDraft> {
    if !is_valid_policy_name(&draft.name) {
        return Err(EngineError::Validation(format!(
            "policy name {:?} must start with a letter and contain only letters, digits, '_' or '-'",
            draft.name
        )));
    }
    Schedule::parse(&draft.schedule)?;
    Retention::parse(&draft.retention)?;

    let mut seen = HashSet::new();
    let mut datasets = Vec::with_capacity(draft.datasets.len());
    for dataset in &draft.datasets {
        let dataset = dataset.trim();
        if dataset.is_empty()
            || dataset.contains('@')
            || dataset.starts_with('/')
            || dataset.ends_with('/')
            || dataset.chars().any(char::is_whitespace)
        {
            return Err(EngineError::Validation(format!(
                "invalid dataset name {dataset:?}"
            )));
        }
        if seen.insert(dataset.to_string()) {
            datasets.push(dataset.to_string());
        }
    }
    if datasets.is_empty() {
        return Err(EngineError::Validation(
            "a policy needs at least one dataset".into(),
        ));
    }

    Ok(PolicyDraft {
        name: draft.name.clone(),
        schedule: draft.schedule.trim().to_string(),
        retention: draft.retention.trim().to_string(),
        datasets,
        enabled: draft.enabled,
    })
}

pub struct PolicyService {
    store: Arc<dyn Store>,
    scheduler: Arc<Scheduler>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub async fn list(&self) -> Result<Vec<SnapshotPolicy>> {
        self.store.list_snapshot_policies().await
    }

    pub async fn get(&self, id: PolicyId) -> Result<SnapshotPolicy> {
        self.store
            .get_snapshot_policy(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("snapshot policy {id}")))
    }

    pub async fn create(&self, draft: PolicyDraft) -> Result<SnapshotPolicy> {
        let draft = validate_draft(&draft)?;
        let policy = self.store.insert_snapshot_policy(&draft).await?;
        info!(policy = %policy.name, id = policy.id, "Snapshot policy created");
        self.reload().await;
        Ok(policy)
    }

    /// Replaces the user-editable fields of an existing policy. The last run
    /// and creation time are preserved.
    pub async fn update(&self, id: PolicyId, draft: PolicyDraft) -> Result<SnapshotPolicy> {
        let draft = validate_draft(&draft)?;
        let mut policy = self.get(id).await?;
        policy.name = draft.name;
        policy.schedule = draft.schedule;
        policy.retention = draft.retention;
        policy.datasets = draft.datasets;
        policy.enabled = draft.enabled;
        policy.updated_at = Utc::now();

        self.store.update_snapshot_policy(&policy).await?;
        info!(policy = %policy.name, id, "Snapshot policy updated");
        self.reload().await;
        Ok(policy)
    }

    pub async fn delete(&self, id: PolicyId) -> Result<()> {
        self.store.delete_snapshot_policy(id).await?;
        info!(id, "Snapshot policy deleted");
        self.reload().await;
        Ok(())
    }

    // The change is already stored; a failed reload is picked up by the
    // next successful one.
    async fn reload(&self) {
        if let Err(e) = self.scheduler.reload().await {
            error!("Scheduler reload after policy change failed: {}", e);
        }
    }
}
