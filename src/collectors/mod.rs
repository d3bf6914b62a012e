//! Metrics Collectors
//!
//! This module turns the engine's in-memory state into Prometheus metrics.
//! Each collector reads one part of the engine (inventory, SMART cache,
//! scheduler, system monitor) and updates the corresponding gauges.
//!
//! # Architecture
//!
//! Collectors follow a consistent pattern:
//! - Accept a `CollectionContext` containing shared state
//! - Read a snapshot of engine state
//! - Reset their labelled gauges so vanished pools, disks or policies drop out
//! - Return `CollectionResult` (Ok(Success) or Ok(Failed))
//!
//! # Error Handling
//!
//! Individual collector failures are non-fatal - they log warnings and return
//! `CollectionStatus::Failed`. The remaining collectors still run.

use crate::engine::Engine;
use crate::metrics::MetricsCollector;
use tracing::{debug, warn};

/// What every collector reads from and writes to
#[derive(Clone, Copy)]
pub struct CollectionContext<'a> {
    pub engine: &'a Engine,
    pub metrics: &'a MetricsCollector,
}

/// Outcome of one collector run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Gauges were refreshed
    Success,
    /// Nothing to export or the source failed; a warning was logged
    Failed,
}

/// `Ok(Failed)` is a skipped collector, `Err(_)` aborts the whole refresh.
pub type CollectionResult = Result<CollectionStatus, anyhow::Error>;

/// Awaits `query_future` and hands its data to `process`. A query error is
/// logged and reported as [`CollectionStatus::Failed`] instead of failing
/// the refresh.
///
/// # Examples
///
/// ```no_run
/// # use nas_engine::collectors::*;
/// async fn example(ctx: &CollectionContext<'_>) -> CollectionResult {
///     collect_with_handler(
///         "snapshot policies",
///         ctx.engine.policies().list(),
///         |policies| {
///             for policy in policies {
///                 // Update metrics...
///             }
///         },
///     )
///     .await
/// }
/// ```
pub async fn collect_with_handler<T, F, P, E>(
    name: &str,
    query_future: F,
    process: P,
) -> CollectionResult
where
    F: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnOnce(T),
{
    match query_future.await {
        Ok(data) => {
            process(data);
            debug!("Refreshed {} metrics", name);
            Ok(CollectionStatus::Success)
        }
        Err(e) => {
            warn!("Skipping {} metrics: {}", name, e);
            Ok(CollectionStatus::Failed)
        }
    }
}

/// Runs every collector and reports whether at least one succeeded.
pub async fn collect_all(ctx: &CollectionContext<'_>) -> anyhow::Result<bool> {
    let mut any_success = false;

    macro_rules! collect {
        ($collector:expr) => {
            match $collector? {
                CollectionStatus::Success => any_success = true,
                CollectionStatus::Failed => { /* Already logged */ }
            }
        };
    }

    collect!(pool::collect_pool_metrics(ctx));
    collect!(dataset::collect_dataset_metrics(ctx));
    collect!(disk::collect_disk_metrics(ctx));
    collect!(smart::collect_smart_metrics(ctx).await);
    collect!(snapshot::collect_snapshot_metrics(ctx).await);
    collect!(system::collect_system_metrics(ctx));

    let monitor = ctx.engine.monitor();
    ctx.metrics
        .monitor_ticks
        .set(i64::try_from(monitor.ticks()).unwrap_or(i64::MAX));
    ctx.metrics
        .up
        .set(if monitor.last_tick_healthy() { 1.0 } else { 0.0 });

    Ok(any_success)
}

pub mod dataset;
pub mod disk;
pub mod pool;
pub mod smart;
pub mod snapshot;
pub mod system;

pub use dataset::collect_dataset_metrics;
pub use disk::collect_disk_metrics;
pub use pool::collect_pool_metrics;
pub use smart::collect_smart_metrics;
pub use snapshot::collect_snapshot_metrics;
pub use system::collect_system_metrics;
