//! Dataset Metrics Collector
//!
//! # Metrics Produced
//! - `nas_dataset_used_bytes` - Space used by the dataset
//!   - Labels: dataset, pool
//! - `nas_dataset_available_bytes` - Space available to the dataset
//!   - Labels: dataset, pool

use super::{CollectionContext, CollectionResult, CollectionStatus};

/// Collects dataset usage from the inventory.
pub fn collect_dataset_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let datasets = ctx.engine.inventory().datasets();
    let metrics = ctx.metrics;

    metrics.dataset_used_bytes.reset();
    metrics.dataset_available_bytes.reset();

    if datasets.is_empty() {
        return Ok(CollectionStatus::Failed);
    }

    for dataset in datasets.iter() {
        let labels = [dataset.name.as_str(), dataset.pool()];
        metrics.set_gauge(&metrics.dataset_used_bytes, &labels, dataset.used as f64);
        metrics.set_gauge(
            &metrics.dataset_available_bytes,
            &labels,
            dataset.available as f64,
        );
    }
    Ok(CollectionStatus::Success)
}
