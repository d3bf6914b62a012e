//! Host Metrics Collector
//!
//! Exports the latest sample held by the system monitor.
//!
//! # Metrics Produced
//! - `nas_cpu_usage_percent`, `nas_cpu_core_usage_percent` (core)
//! - `nas_load_average` (period = 1m, 5m, 15m)
//! - `nas_memory_total_bytes`, `nas_memory_used_bytes`, `nas_memory_available_bytes`
//! - `nas_swap_total_bytes`, `nas_swap_used_bytes`
//! - `nas_network_received_bytes`, `nas_network_transmitted_bytes` and their
//!   `_rate_bytes` counterparts (interface)
//! - `nas_disk_io_read_bytes`, `nas_disk_io_written_bytes` and their
//!   `_rate_bytes` counterparts (device)
//! - `nas_uptime_seconds`

use super::{CollectionContext, CollectionResult, CollectionStatus};
use tracing::debug;

/// Collects host resource usage
///
/// # Returns
///
/// * `Ok(CollectionStatus::Success)` - Gauges reflect the latest sample
/// * `Ok(CollectionStatus::Failed)` - No sample has been taken yet
pub fn collect_system_metrics(ctx: &CollectionContext<'_>) -> CollectionResult {
    let stats = ctx.engine.system().stats();
    let metrics = ctx.metrics;

    metrics.cpu_core_usage_percent.reset();
    metrics.load_average.reset();
    metrics.network_received_bytes.reset();
    metrics.network_transmitted_bytes.reset();
    metrics.network_receive_rate_bytes.reset();
    metrics.network_transmit_rate_bytes.reset();
    metrics.disk_io_read_bytes.reset();
    metrics.disk_io_written_bytes.reset();
    metrics.disk_io_read_rate_bytes.reset();
    metrics.disk_io_write_rate_bytes.reset();

    if stats.collected_at.is_none() {
        debug!("No system sample yet");
        return Ok(CollectionStatus::Failed);
    }

    metrics.cpu_usage_percent.set(stats.cpu.global_percent);
    for (core, usage) in stats.cpu.per_core_percent.iter().enumerate() {
        let core = core.to_string();
        metrics.set_gauge(&metrics.cpu_core_usage_percent, &[core.as_str()], *usage);
    }
    let load = &stats.cpu.load_average;
    for (period, value) in [("1m", load.one), ("5m", load.five), ("15m", load.fifteen)] {
        metrics.set_gauge(&metrics.load_average, &[period], value);
    }

    let memory = &stats.memory;
    metrics.memory_total_bytes.set(memory.total_bytes as f64);
    metrics.memory_used_bytes.set(memory.used_bytes as f64);
    metrics.memory_available_bytes.set(memory.available_bytes as f64);
    metrics.swap_total_bytes.set(memory.swap_total_bytes as f64);
    metrics.swap_used_bytes.set(memory.swap_used_bytes as f64);

    for (name, interface) in &stats.network {
        let labels = [name.as_str()];
        metrics.set_gauge(&metrics.network_received_bytes, &labels, interface.rx_bytes as f64);
        metrics.set_gauge(&metrics.network_transmitted_bytes, &labels, interface.tx_bytes as f64);
        metrics.set_gauge(
            &metrics.network_receive_rate_bytes,
            &labels,
            interface.rx_bytes_per_second as f64,
        );
        metrics.set_gauge(
            &metrics.network_transmit_rate_bytes,
            &labels,
            interface.tx_bytes_per_second as f64,
        );
    }

    for (name, disk) in &stats.disk_io {
        let labels = [name.as_str()];
        metrics.set_gauge(&metrics.disk_io_read_bytes, &labels, disk.read_bytes as f64);
        metrics.set_gauge(&metrics.disk_io_written_bytes, &labels, disk.write_bytes as f64);
        metrics.set_gauge(
            &metrics.disk_io_read_rate_bytes,
            &labels,
            disk.read_bytes_per_second as f64,
        );
        metrics.set_gauge(
            &metrics.disk_io_write_rate_bytes,
            &labels,
            disk.write_bytes_per_second as f64,
        );
    }

    metrics.uptime_seconds.set(stats.host.uptime_seconds as f64);
    Ok(CollectionStatus::Success)
}
