//! SMART Metrics Collector
//!
//! Exports the readings held by the SMART cache. Nothing here probes a disk;
//! the collector only reports what the monitor has already fetched.
//!
//! # Metrics Produced
//! - `nas_disk_smart_healthy` - SMART overall health (1=passed, 0=failed or unknown)
//!   - Labels: device, health
//! - `nas_disk_temperature_celsius` - Disk temperature reported by SMART
//!   - Labels: device
//! - `nas_disk_power_on_hours` - Disk power-on hours
//!   - Labels: device
//! - `nas_disk_sector_errors` - Reallocated, pending and uncorrectable sectors
//!   - Labels: device, type

use super::{CollectionContext, CollectionResult, CollectionStatus};
use tracing::warn;

/// Collects cached SMART readings
///
/// # Returns
///
/// * `Ok(CollectionStatus::Success)` - At least one reading was exported
/// * `Ok(CollectionStatus::Failed)` - The cache holds no reading yet
pub async fn collect_smart_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let readings = ctx.engine.smart_cache().readings();
    let metrics = ctx.metrics;

    metrics.disk_smart_healthy.reset();
    metrics.disk_temperature_celsius.reset();
    metrics.disk_power_on_hours.reset();
    metrics.disk_sector_errors.reset();

    if readings.is_empty() {
        return Ok(CollectionStatus::Failed);
    }

    for reading in &readings {
        let device = reading.device.as_str();
        let healthy = if reading.is_passing() {
            1.0
        } else {
            warn!(
                "SMART health for disk {} is {}",
                device,
                reading.health.as_str()
            );
            0.0
        };
        metrics.set_gauge(
            &metrics.disk_smart_healthy,
            &[device, reading.health.as_str()],
            healthy,
        );

        if let Some(temperature) = reading.temperature_celsius {
            metrics.set_gauge(
                &metrics.disk_temperature_celsius,
                &[device],
                temperature as f64,
            );
        }
        if let Some(hours) = reading.power_on_hours {
            metrics.set_gauge(&metrics.disk_power_on_hours, &[device], hours as f64);
        }

        let sectors = [
            ("reallocated", reading.reallocated_sectors),
            ("pending", reading.pending_sectors),
            ("uncorrectable", reading.uncorrectable_sectors),
        ];
        for (kind, count) in sectors {
            if let Some(count) = count {
                metrics.set_gauge(&metrics.disk_sector_errors, &[device, kind], count as f64);
            }
        }
    }
    Ok(CollectionStatus::Success)
}
