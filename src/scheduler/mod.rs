//! Snapshot-Policy Scheduler
//!
//! Evaluates every enabled policy once per tick, snapshots the datasets of
//! the due ones and prunes what falls outside their retention.
//!
//! # Execution Model
//!
//! - Each due policy runs on its own task, tracked by a [`TaskTracker`].
//! - A policy still running when the next tick finds it due is skipped for
//!   that tick. At most one execution per policy exists at any time.
//! - An execution works from the policy definition it was started with.
//!   [`Scheduler::reload`] swaps the working copy atomically and only later
//!   ticks see the new definitions.
//! - Once all create and prune operations of a run have finished, the tick
//!   timestamp is recorded as the policy's last run, even when some of them
//!   failed, and a summary event is published per outcome.
//!
//! # Lifecycle
//!
//! [`Scheduler::start`] loads the policies (failure is fatal) and spawns the
//! tick loop. [`Scheduler::stop`] ends the loop and waits for running
//! executions. Executions are bounded by the command timeout and by the
//! token passed to `start`, not by `stop`.

use crate::error::{EngineError, Result};
use crate::events::{Event, EventBus, EventKind, Severity};
use crate::store::{PolicyId, SnapshotPolicy, Store};
use crate::zfs::{SnapshotRef, ZfsGateway};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

pub mod retention;
pub mod schedule;

pub use retention::{parse_snapshot_name, snapshot_name, Retention};
pub use schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    Idle,
    Running,
    Disabled,
}

impl PolicyState {
    pub const ALL: [PolicyState; 3] = [PolicyState::Idle, PolicyState::Running, PolicyState::Disabled];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyState::Idle => "idle",
            PolicyState::Running => "running",
            PolicyState::Disabled => "disabled",
        }
    }
}

/// A policy with its schedule and retention already parsed
#[derive(Debug, Clone)]
pub struct ScheduledPolicy {
    pub policy: SnapshotPolicy,
    pub schedule: Schedule,
    pub retention: Retention,
}

impl ScheduledPolicy {
    pub fn new(policy: SnapshotPolicy) -> Result<Self> {
        let schedule = Schedule::parse(&policy.schedule)?;
        let retention = Retention::parse(&policy.retention)?;
        Ok(Self {
            policy,
            schedule,
            retention,
        })
    }
}

type WorkingCopy = Arc<Vec<Arc<ScheduledPolicy>>>;

struct LoopHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SchedulerState {
    store: Arc<dyn Store>,
    gateway: ZfsGateway,
    bus: Arc<EventBus>,
    policies: RwLock<WorkingCopy>,
    reload_lock: tokio::sync::Mutex<()>,
    running: Mutex<HashSet<PolicyId>>,
    last_runs: Mutex<HashMap<PolicyId, DateTime<Utc>>>,
    first_seen: Mutex<HashMap<PolicyId, DateTime<Utc>>>,
    executions: TaskTracker,
    execution_cancel: Mutex<CancellationToken>,
    span: Span,
}

pub struct Scheduler {
    state: Arc<SchedulerState>,
    tick: Duration,
    running: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: ZfsGateway,
        bus: Arc<EventBus>,
        tick: Duration,
    ) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                store,
                gateway,
                bus,
                policies: RwLock::new(Arc::new(Vec::new())),
                reload_lock: tokio::sync::Mutex::new(()),
                running: Mutex::new(HashSet::new()),
                last_runs: Mutex::new(HashMap::new()),
                first_seen: Mutex::new(HashMap::new()),
                executions: TaskTracker::new(),
                execution_cancel: Mutex::new(CancellationToken::new()),
                span: info_span!("scheduler"),
            }),
            tick,
            running: Mutex::new(None),
        }
    }

    /// Loads the policy set and spawns the tick loop. The first tick fires
    /// immediately.
    pub async fn start(&self, parent: &CancellationToken) -> Result<()> {
        if lock(&self.running).is_some() {
            warn!(parent: &self.state.span, "Scheduler already running");
            return Ok(());
        }

        *lock(&self.state.execution_cancel) = parent.child_token();
        self.reload().await?;

        let cancel = parent.child_token();
        let loop_cancel = cancel.clone();
        let state = Arc::clone(&self.state);
        let tick = self.tick;

        let handle = tokio::spawn(
            async move {
                info!(tick_secs = tick.as_secs(), "Scheduler started");
                let mut ticker = tokio::time::interval(tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = loop_cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            state.tick(Utc::now());
                        }
                    }
                }
                info!("Scheduler loop stopped");
            }
            .instrument(self.state.span.clone()),
        );

        *lock(&self.running) = Some(LoopHandle { cancel, handle });
        Ok(())
    }

    /// Ends the tick loop and waits for running executions to finish.
    pub async fn stop(&self) {
        let running = lock(&self.running).take();
        if let Some(LoopHandle { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(parent: &self.state.span, "Scheduler task ended abnormally: {}", e);
            }
        }
        self.drain().await;
        info!(parent: &self.state.span, "Scheduler stopped");
    }

    /// Re-reads every policy from the store and swaps the working copy.
    ///
    /// Policies whose stored schedule or retention no longer parses are
    /// logged and left out. Concurrent reloads are serialized.
    pub async fn reload(&self) -> Result<()> {
        self.state.reload().await
    }

    /// Evaluates all policies as of `now` and launches the due ones.
    /// Returns the number of executions started.
    pub fn tick_at(&self, now: DateTime<Utc>) -> usize {
        self.state.tick(now)
    }

    /// Waits until every execution started so far has finished.
    pub async fn drain(&self) {
        self.state.executions.close();
        self.state.executions.wait().await;
        self.state.executions.reopen();
    }

    pub fn state(&self, id: PolicyId) -> Option<PolicyState> {
        if lock(&self.state.running).contains(&id) {
            return Some(PolicyState::Running);
        }
        self.state
            .working_copy()
            .iter()
            .find(|p| p.policy.id == id)
            .map(|p| {
                if p.policy.enabled {
                    PolicyState::Idle
                } else {
                    PolicyState::Disabled
                }
            })
    }

    /// The policy set as of the last reload.
    pub fn policies(&self) -> Vec<Arc<ScheduledPolicy>> {
        self.state.working_copy().as_ref().clone()
    }

    /// Most recent run known for `id`, including runs whose persistence
    /// failed.
    pub fn last_run(&self, id: PolicyId) -> Option<DateTime<Utc>> {
        let stored = self
            .state
            .working_copy()
            .iter()
            .find(|p| p.policy.id == id)
            .and_then(|p| p.policy.last_run);
        self.state.effective_last_run(id, stored)
    }

    /// Earliest time `id` could next run, as of `now`.
    pub fn next_run(&self, id: PolicyId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let policy = self
            .state
            .working_copy()
            .iter()
            .find(|p| p.policy.id == id && p.policy.enabled)
            .cloned()?;
        let last_run = self.state.effective_last_run(id, policy.policy.last_run);
        let reference = last_run
            .or_else(|| lock(&self.state.first_seen).get(&id).copied())
            .unwrap_or(now);
        policy
            .schedule
            .next_after(last_run, reference)
            .map(|at| at.max(now))
    }
}

impl SchedulerState {
    fn working_copy(&self) -> WorkingCopy {
        self.policies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn effective_last_run(
        &self,
        id: PolicyId,
        stored: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let observed = lock(&self.last_runs).get(&id).copied();
        stored.max(observed)
    }

    async fn reload(&self) -> Result<()> {
        let _serialized = self.reload_lock.lock().await;

        let stored = self.store.list_snapshot_policies().await?;
        let total = stored.len();
        let mut skipped = Vec::new();
        let mut policies = Vec::with_capacity(total);
        for policy in stored {
            let name = policy.name.clone();
            match ScheduledPolicy::new(policy) {
                Ok(scheduled) => policies.push(Arc::new(scheduled)),
                Err(e) => {
                    error!(parent: &self.span, policy = %name, "Skipping unparseable policy: {}", e);
                    skipped.push(name);
                }
            }
        }

        let ids: HashSet<PolicyId> = policies.iter().map(|p| p.policy.id).collect();
        lock(&self.first_seen).retain(|id, _| ids.contains(id));
        lock(&self.last_runs).retain(|id, _| ids.contains(id));

        let enabled = policies.iter().filter(|p| p.policy.enabled).count();
        *self
            .policies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(policies);
        info!(parent: &self.span, total, enabled, "Policies reloaded");

        self.bus
            .publish(Event::new(EventKind::PolicyReloaded).with_payload(json!({
                "policies": total,
                "enabled": enabled,
                "skipped": skipped,
            })))
            .await;
        Ok(())
    }

    fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> usize {
        let policies = self.working_copy();
        let mut launched = 0;

        for scheduled in policies.iter().filter(|p| p.policy.enabled) {
            let id = scheduled.policy.id;
            let first_seen = *lock(&self.first_seen).entry(id).or_insert(now);
            let last_run = self.effective_last_run(id, scheduled.policy.last_run);
            if !scheduled.schedule.is_due(last_run, first_seen, now) {
                continue;
            }

            let Some(guard) = RunGuard::acquire(self, id) else {
                debug!(parent: &self.span, policy = %scheduled.policy.name, "Still running, skipping this tick");
                continue;
            };

            let state = Arc::clone(self);
            let scheduled = Arc::clone(scheduled);
            let cancel = lock(&self.execution_cancel).clone();
            let span = info_span!(parent: &self.span, "policy", name = %scheduled.policy.name);
            self.executions.spawn(
                async move {
                    let _guard = guard;
                    state.execute(&scheduled, now, &cancel).await;
                }
                .instrument(span),
            );
            launched += 1;
        }
        launched
    }

    async fn execute(&self, scheduled: &ScheduledPolicy, now: DateTime<Utc>, cancel: &CancellationToken) {
        let policy = &scheduled.policy;
        let name = snapshot_name(&policy.name, now);
        info!(datasets = policy.datasets.len(), snapshot = %name, "Running snapshot policy");

        let mut created = Vec::new();
        let mut pruned = Vec::new();
        let mut failures = Vec::new();

        for dataset in &policy.datasets {
            let full_name = format!("{dataset}@{name}");
            match self.gateway.create_snapshot(cancel, dataset, &name).await {
                Ok(()) => created.push(full_name),
                Err(EngineError::AlreadyExists(_)) => {
                    debug!(snapshot = %full_name, "Snapshot already exists");
                    created.push(full_name);
                }
                Err(e) => {
                    error!(dataset = %dataset, "Snapshot creation failed: {}", e);
                    failures.push(json!({
                        "dataset": dataset,
                        "operation": "create",
                        "error": e.to_string(),
                    }));
                }
            }
        }

        if scheduled.retention != Retention::Forever {
            for dataset in &policy.datasets {
                self.prune(scheduled, dataset, now, cancel, &mut pruned, &mut failures)
                    .await;
            }
        }

        lock(&self.last_runs).insert(policy.id, now);
        if let Err(e) = self.store.update_snapshot_policy_last_run(policy.id, now).await {
            warn!("Failed to persist last run: {}", e);
        }

        if !created.is_empty() {
            self.bus
                .publish(Event::new(EventKind::SnapshotCreated).with_payload(json!({
                    "policy": policy.name,
                    "snapshots": created,
                })))
                .await;
        }
        if !pruned.is_empty() {
            self.bus
                .publish(Event::new(EventKind::SnapshotPruned).with_payload(json!({
                    "policy": policy.name,
                    "snapshots": pruned,
                })))
                .await;
        }
        if !failures.is_empty() {
            self.bus
                .publish(
                    Event::new(EventKind::SnapshotFailed)
                        .with_severity(Severity::Error)
                        .with_payload(json!({
                            "policy": policy.name,
                            "failures": failures,
                        })),
                )
                .await;
        }

        info!(
            created = created.len(),
            pruned = pruned.len(),
            failed = failures.len(),
            "Snapshot policy finished"
        );
    }

    async fn prune(
        &self,
        scheduled: &ScheduledPolicy,
        dataset: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        pruned: &mut Vec<String>,
        failures: &mut Vec<serde_json::Value>,
    ) {
        let snapshots = match self.gateway.list_snapshots(cancel, dataset).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!(dataset = %dataset, "Listing snapshots for pruning failed: {}", e);
                failures.push(json!({
                    "dataset": dataset,
                    "operation": "list",
                    "error": e.to_string(),
                }));
                return;
            }
        };

        let candidates: Vec<(DateTime<Utc>, SnapshotRef)> = snapshots
            .into_iter()
            .filter_map(|s| parse_snapshot_name(&scheduled.policy.name, &s.name).map(|at| (at, s)))
            .collect();

        for snapshot in scheduled.retention.select_expired(candidates, now) {
            match self.gateway.destroy_snapshot(cancel, &snapshot).await {
                Ok(()) => pruned.push(snapshot.full_name()),
                Err(EngineError::NotFound(_)) => {
                    debug!(snapshot = %snapshot, "Snapshot already gone");
                }
                Err(e) => {
                    error!(snapshot = %snapshot, "Pruning failed: {}", e);
                    failures.push(json!({
                        "dataset": dataset,
                        "snapshot": snapshot.full_name(),
                        "operation": "destroy",
                        "error": e.to_string(),
                    }));
                }
            }
        }
    }
}

/// Marks a policy as running for as long as it is alive
struct RunGuard {
    state: Arc<SchedulerState>,
    id: PolicyId,
}

impl RunGuard {
    fn acquire(state: &Arc<SchedulerState>, id: PolicyId) -> Option<Self> {
        if !lock(&state.running).insert(id) {
            return None;
        }
        Some(Self {
            state: Arc::clone(state),
            id,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock(&self.state.running).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
