//! Pool Metrics Collector
//!
//! Exports the pools found by the last ZFS scan.
//!
//! # Metrics Produced
//! - `nas_pool_health` - Pool health status (1=online, 0=otherwise)
//!   - Labels: pool, status
//! - `nas_pool_size_bytes` - Total storage capacity of the ZFS pool
//!   - Labels: pool
//! - `nas_pool_allocated_bytes` - Allocated storage capacity of the ZFS pool
//!   - Labels: pool
//! - `nas_pool_free_bytes` - Free storage capacity of the ZFS pool
//!   - Labels: pool

use super::{CollectionContext, CollectionResult, CollectionStatus};
use tracing::debug;

/// Collects ZFS pool metrics from the inventory
///
/// # Returns
///
/// * `Ok(CollectionStatus::Success)` - Pool gauges reflect the inventory
/// * `Ok(CollectionStatus::Failed)` - No pool has been scanned yet
pub fn collect_pool_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let pools = ctx.engine.inventory().pools();
    let metrics = ctx.metrics;

    metrics.pool_health.reset();
    metrics.pool_size_bytes.reset();
    metrics.pool_allocated_bytes.reset();
    metrics.pool_free_bytes.reset();

    if pools.is_empty() {
        debug!("No pools in inventory");
        return Ok(CollectionStatus::Failed);
    }

    for pool in pools.iter() {
        let health_value = if pool.health.is_online() { 1.0 } else { 0.0 };
        metrics.set_gauge(
            &metrics.pool_health,
            &[&pool.name, pool.health.as_str()],
            health_value,
        );
        metrics.set_gauge(&metrics.pool_size_bytes, &[&pool.name], pool.size as f64);
        metrics.set_gauge(
            &metrics.pool_allocated_bytes,
            &[&pool.name],
            pool.allocated as f64,
        );
        metrics.set_gauge(&metrics.pool_free_bytes, &[&pool.name], pool.free as f64);
    }
    Ok(CollectionStatus::Success)
}
