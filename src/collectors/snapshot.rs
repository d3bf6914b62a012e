//! Snapshot Policy Metrics Collector
//!
//! # Metrics Produced
//! - `nas_policy_last_run_timestamp_seconds` - Unix time of the last completed run
//!   - Labels: policy
//! - `nas_policy_next_run_timestamp_seconds` - Unix time of the next scheduled run
//!   - Labels: policy
//! - `nas_policy_state` - 1 for the policy's current scheduler state, 0 otherwise
//!   - Labels: policy, state

use super::{collect_with_handler, CollectionContext, CollectionResult};
use crate::scheduler::PolicyState;
use chrono::Utc;

/// Collects snapshot policy metrics
///
/// Policies come from the store so that ones the scheduler skipped (for
/// example because their schedule no longer parses) still show up with a
/// last run. Run times and state come from the scheduler, which also knows
/// about runs whose persistence failed.
pub async fn collect_snapshot_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let scheduler = ctx.engine.scheduler();
    let metrics = ctx.metrics;
    let now = Utc::now();

    collect_with_handler(
        "snapshot policies",
        ctx.engine.policies().list(),
        |policies| {
            metrics.policy_last_run_timestamp_seconds.reset();
            metrics.policy_next_run_timestamp_seconds.reset();
            metrics.policy_state.reset();

            for policy in policies {
                let name = policy.name.as_str();
                let last_run = scheduler.last_run(policy.id).or(policy.last_run);
                if let Some(last_run) = last_run {
                    metrics.set_gauge(
                        &metrics.policy_last_run_timestamp_seconds,
                        &[name],
                        last_run.timestamp() as f64,
                    );
                }
                if let Some(next_run) = scheduler.next_run(policy.id, now) {
                    metrics.set_gauge(
                        &metrics.policy_next_run_timestamp_seconds,
                        &[name],
                        next_run.timestamp() as f64,
                    );
                }
                if let Some(current) = scheduler.state(policy.id) {
                    for state in PolicyState::ALL {
                        metrics
                            .policy_state
                            .with_label_values(&[name, state.as_str()])
                            .set(i64::from(state == current));
                    }
                }
            }
        },
    )
    .await
}
