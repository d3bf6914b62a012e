//! Disk Metrics Collector
//!
//! # Metrics Produced
//! - `nas_disk_info` - Disk identity (always 1)
//!   - Labels: device, model, serial, transport
//! - `nas_disk_size_bytes` - Raw size of the disk
//!   - Labels: device

use super::{CollectionContext, CollectionResult, CollectionStatus};

/// Collects the disk inventory.
///
/// Missing model or serial numbers are exported as empty labels.
pub fn collect_disk_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let disks = ctx.engine.inventory().disks();
    let metrics = ctx.metrics;

    metrics.disk_info.reset();
    metrics.disk_size_bytes.reset();

    if disks.is_empty() {
        return Ok(CollectionStatus::Failed);
    }

    for disk in disks.iter() {
        metrics
            .disk_info
            .with_label_values(&[
                disk.path.as_str(),
                disk.model.as_deref().unwrap_or_default(),
                disk.serial.as_deref().unwrap_or_default(),
                disk.transport.as_str(),
            ])
            .set(1);
        metrics.set_gauge(
            &metrics.disk_size_bytes,
            &[&disk.path],
            disk.size_bytes as f64,
        );
    }
    Ok(CollectionStatus::Success)
}
