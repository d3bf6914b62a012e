//! Prometheus Metrics Definitions
//!
//! This module defines every Prometheus metric exposed by the engine.
//!
//! # Metric Categories
//!
//! ## Storage
//! - Pool health and capacity
//! - Dataset usage
//!
//! ## Disks
//! - Disk inventory and size
//! - SMART health, temperature, power-on hours and sector counters
//!
//! ## Snapshot Policies
//! - Last and next run timestamps
//! - Current scheduler state per policy
//!
//! ## Host
//! - CPU usage (global and per core) and load average
//! - Memory and swap
//! - Network and disk I/O totals and rates
//! - Uptime
//!
//! ## Engine
//! - Events published, by kind and severity
//! - Events lost by the metrics subscriber on overflow
//! - Monitor tick count and overall health (`up`)
//!
//! All metrics use the `nas_` namespace prefix.

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

const NAMESPACE: &str = "nas";

/// Metrics collector for the engine
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    // Pool metrics
    pub pool_health: Arc<GaugeVec>,
    pub pool_size_bytes: Arc<GaugeVec>,
    pub pool_allocated_bytes: Arc<GaugeVec>,
    pub pool_free_bytes: Arc<GaugeVec>,

    // Dataset metrics
    pub dataset_used_bytes: Arc<GaugeVec>,
    pub dataset_available_bytes: Arc<GaugeVec>,

    // Disk metrics
    pub disk_info: Arc<IntGaugeVec>,
    pub disk_size_bytes: Arc<GaugeVec>,

    // SMART metrics
    pub disk_smart_healthy: Arc<GaugeVec>,
    pub disk_temperature_celsius: Arc<GaugeVec>,
    pub disk_power_on_hours: Arc<GaugeVec>,
    pub disk_sector_errors: Arc<GaugeVec>,

    // Snapshot policy metrics
    pub policy_last_run_timestamp_seconds: Arc<GaugeVec>,
    pub policy_next_run_timestamp_seconds: Arc<GaugeVec>,
    pub policy_state: Arc<IntGaugeVec>,

    // Host metrics
    pub cpu_usage_percent: Arc<Gauge>,
    pub cpu_core_usage_percent: Arc<GaugeVec>,
    pub load_average: Arc<GaugeVec>,
    pub memory_total_bytes: Arc<Gauge>,
    pub memory_used_bytes: Arc<Gauge>,
    pub memory_available_bytes: Arc<Gauge>,
    pub swap_total_bytes: Arc<Gauge>,
    pub swap_used_bytes: Arc<Gauge>,
    pub network_received_bytes: Arc<GaugeVec>,
    pub network_transmitted_bytes: Arc<GaugeVec>,
    pub network_receive_rate_bytes: Arc<GaugeVec>,
    pub network_transmit_rate_bytes: Arc<GaugeVec>,
    pub disk_io_read_bytes: Arc<GaugeVec>,
    pub disk_io_written_bytes: Arc<GaugeVec>,
    pub disk_io_read_rate_bytes: Arc<GaugeVec>,
    pub disk_io_write_rate_bytes: Arc<GaugeVec>,
    pub uptime_seconds: Arc<Gauge>,

    // Engine metrics
    pub events_total: Arc<IntCounterVec>,
    pub events_dropped_total: Arc<IntCounter>,
    pub monitor_ticks: Arc<IntGauge>,
    pub up: Arc<Gauge>,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Pool metrics
        let pool_health = GaugeVec::new(
            Opts::new("pool_health", "Pool health status (1=online, 0=otherwise)")
                .namespace(NAMESPACE),
            &["pool", "status"],
        )?;

        let pool_size_bytes = GaugeVec::new(
            Opts::new("pool_size_bytes", "Total storage capacity of the ZFS pool")
                .namespace(NAMESPACE),
            &["pool"],
        )?;

        let pool_allocated_bytes = GaugeVec::new(
            Opts::new(
                "pool_allocated_bytes",
                "Allocated storage capacity of the ZFS pool",
            )
            .namespace(NAMESPACE),
            &["pool"],
        )?;

        let pool_free_bytes = GaugeVec::new(
            Opts::new("pool_free_bytes", "Free storage capacity of the ZFS pool")
                .namespace(NAMESPACE),
            &["pool"],
        )?;

        // Dataset metrics
        let dataset_used_bytes = GaugeVec::new(
            Opts::new("dataset_used_bytes", "Space used by the dataset").namespace(NAMESPACE),
            &["dataset", "pool"],
        )?;

        let dataset_available_bytes = GaugeVec::new(
            Opts::new(
                "dataset_available_bytes",
                "Space available to the dataset",
            )
            .namespace(NAMESPACE),
            &["dataset", "pool"],
        )?;

        // Disk metrics
        let disk_info = IntGaugeVec::new(
            Opts::new("disk_info", "Disk identity (always 1)").namespace(NAMESPACE),
            &["device", "model", "serial", "transport"],
        )?;

        let disk_size_bytes = GaugeVec::new(
            Opts::new("disk_size_bytes", "Raw size of the disk").namespace(NAMESPACE),
            &["device"],
        )?;

        // SMART metrics
        let disk_smart_healthy = GaugeVec::new(
            Opts::new(
                "disk_smart_healthy",
                "SMART overall health (1=passed, 0=failed or unknown)",
            )
            .namespace(NAMESPACE),
            &["device", "health"],
        )?;

        let disk_temperature_celsius = GaugeVec::new(
            Opts::new(
                "disk_temperature_celsius",
                "Disk temperature reported by SMART",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let disk_power_on_hours = GaugeVec::new(
            Opts::new("disk_power_on_hours", "Disk power-on hours").namespace(NAMESPACE),
            &["device"],
        )?;

        let disk_sector_errors = GaugeVec::new(
            Opts::new(
                "disk_sector_errors",
                "SMART sector counters (reallocated/pending/uncorrectable)",
            )
            .namespace(NAMESPACE),
            &["device", "type"],
        )?;

        // Snapshot policy metrics
        let policy_last_run_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "policy_last_run_timestamp_seconds",
                "Unix time of the last completed run of the snapshot policy",
            )
            .namespace(NAMESPACE),
            &["policy"],
        )?;

        let policy_next_run_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "policy_next_run_timestamp_seconds",
                "Unix time of the next scheduled run of the snapshot policy",
            )
            .namespace(NAMESPACE),
            &["policy"],
        )?;

        let policy_state = IntGaugeVec::new(
            Opts::new(
                "policy_state",
                "Scheduler state of the snapshot policy (1 for the current state)",
            )
            .namespace(NAMESPACE),
            &["policy", "state"],
        )?;

        // Host metrics
        let cpu_usage_percent = Gauge::with_opts(
            Opts::new("cpu_usage_percent", "CPU usage across all cores").namespace(NAMESPACE),
        )?;

        let cpu_core_usage_percent = GaugeVec::new(
            Opts::new("cpu_core_usage_percent", "CPU usage of one logical core")
                .namespace(NAMESPACE),
            &["core"],
        )?;

        let load_average = GaugeVec::new(
            Opts::new("load_average", "System load average").namespace(NAMESPACE),
            &["period"],
        )?;

        let memory_total_bytes = Gauge::with_opts(
            Opts::new("memory_total_bytes", "Installed memory").namespace(NAMESPACE),
        )?;

        let memory_used_bytes = Gauge::with_opts(
            Opts::new("memory_used_bytes", "Memory in use").namespace(NAMESPACE),
        )?;

        let memory_available_bytes = Gauge::with_opts(
            Opts::new(
                "memory_available_bytes",
                "Memory available to new allocations",
            )
            .namespace(NAMESPACE),
        )?;

        let swap_total_bytes = Gauge::with_opts(
            Opts::new("swap_total_bytes", "Configured swap").namespace(NAMESPACE),
        )?;

        let swap_used_bytes = Gauge::with_opts(
            Opts::new("swap_used_bytes", "Swap in use").namespace(NAMESPACE),
        )?;

        let network_received_bytes = GaugeVec::new(
            Opts::new("network_received_bytes", "Bytes received by the interface")
                .namespace(NAMESPACE),
            &["interface"],
        )?;

        let network_transmitted_bytes = GaugeVec::new(
            Opts::new(
                "network_transmitted_bytes",
                "Bytes transmitted by the interface",
            )
            .namespace(NAMESPACE),
            &["interface"],
        )?;

        let network_receive_rate_bytes = GaugeVec::new(
            Opts::new(
                "network_receive_rate_bytes",
                "Receive rate over the last sample, in bytes per second",
            )
            .namespace(NAMESPACE),
            &["interface"],
        )?;

        let network_transmit_rate_bytes = GaugeVec::new(
            Opts::new(
                "network_transmit_rate_bytes",
                "Transmit rate over the last sample, in bytes per second",
            )
            .namespace(NAMESPACE),
            &["interface"],
        )?;

        let disk_io_read_bytes = GaugeVec::new(
            Opts::new("disk_io_read_bytes", "Bytes read from the block device")
                .namespace(NAMESPACE),
            &["device"],
        )?;

        let disk_io_written_bytes = GaugeVec::new(
            Opts::new("disk_io_written_bytes", "Bytes written to the block device")
                .namespace(NAMESPACE),
            &["device"],
        )?;

        let disk_io_read_rate_bytes = GaugeVec::new(
            Opts::new(
                "disk_io_read_rate_bytes",
                "Read rate over the last sample, in bytes per second",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let disk_io_write_rate_bytes = GaugeVec::new(
            Opts::new(
                "disk_io_write_rate_bytes",
                "Write rate over the last sample, in bytes per second",
            )
            .namespace(NAMESPACE),
            &["device"],
        )?;

        let uptime_seconds = Gauge::with_opts(
            Opts::new("uptime_seconds", "Host uptime").namespace(NAMESPACE),
        )?;

        // Engine metrics
        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Events published on the event bus").namespace(NAMESPACE),
            &["kind", "severity"],
        )?;

        let events_dropped_total = IntCounter::with_opts(
            Opts::new(
                "events_dropped_total",
                "Events the metrics subscriber missed because it fell behind",
            )
            .namespace(NAMESPACE),
        )?;

        let monitor_ticks = IntGauge::with_opts(
            Opts::new("monitor_ticks", "Monitor ticks completed since start").namespace(NAMESPACE),
        )?;

        let up = Gauge::with_opts(
            Opts::new("up", "Whether the last monitor tick was healthy (1=yes, 0=no)")
                .namespace(NAMESPACE),
        )?;

        // Register all metrics
        registry.register(Box::new(pool_health.clone()))?;
        registry.register(Box::new(pool_size_bytes.clone()))?;
        registry.register(Box::new(pool_allocated_bytes.clone()))?;
        registry.register(Box::new(pool_free_bytes.clone()))?;
        registry.register(Box::new(dataset_used_bytes.clone()))?;
        registry.register(Box::new(dataset_available_bytes.clone()))?;
        registry.register(Box::new(disk_info.clone()))?;
        registry.register(Box::new(disk_size_bytes.clone()))?;
        registry.register(Box::new(disk_smart_healthy.clone()))?;
        registry.register(Box::new(disk_temperature_celsius.clone()))?;
        registry.register(Box::new(disk_power_on_hours.clone()))?;
        registry.register(Box::new(disk_sector_errors.clone()))?;
        registry.register(Box::new(policy_last_run_timestamp_seconds.clone()))?;
        registry.register(Box::new(policy_next_run_timestamp_seconds.clone()))?;
        registry.register(Box::new(policy_state.clone()))?;
        registry.register(Box::new(cpu_usage_percent.clone()))?;
        registry.register(Box::new(cpu_core_usage_percent.clone()))?;
        registry.register(Box::new(load_average.clone()))?;
        registry.register(Box::new(memory_total_bytes.clone()))?;
        registry.register(Box::new(memory_used_bytes.clone()))?;
        registry.register(Box::new(memory_available_bytes.clone()))?;
        registry.register(Box::new(swap_total_bytes.clone()))?;
        registry.register(Box::new(swap_used_bytes.clone()))?;
        registry.register(Box::new(network_received_bytes.clone()))?;
        registry.register(Box::new(network_transmitted_bytes.clone()))?;
        registry.register(Box::new(network_receive_rate_bytes.clone()))?;
        registry.register(Box::new(network_transmit_rate_bytes.clone()))?;
        registry.register(Box::new(disk_io_read_bytes.clone()))?;
        registry.register(Box::new(disk_io_written_bytes.clone()))?;
        registry.register(Box::new(disk_io_read_rate_bytes.clone()))?;
        registry.register(Box::new(disk_io_write_rate_bytes.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(events_dropped_total.clone()))?;
        registry.register(Box::new(monitor_ticks.clone()))?;
        registry.register(Box::new(up.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            pool_health: Arc::new(pool_health),
            pool_size_bytes: Arc::new(pool_size_bytes),
            pool_allocated_bytes: Arc::new(pool_allocated_bytes),
            pool_free_bytes: Arc::new(pool_free_bytes),
            dataset_used_bytes: Arc::new(dataset_used_bytes),
            dataset_available_bytes: Arc::new(dataset_available_bytes),
            disk_info: Arc::new(disk_info),
            disk_size_bytes: Arc::new(disk_size_bytes),
            disk_smart_healthy: Arc::new(disk_smart_healthy),
            disk_temperature_celsius: Arc::new(disk_temperature_celsius),
            disk_power_on_hours: Arc::new(disk_power_on_hours),
            disk_sector_errors: Arc::new(disk_sector_errors),
            policy_last_run_timestamp_seconds: Arc::new(policy_last_run_timestamp_seconds),
            policy_next_run_timestamp_seconds: Arc::new(policy_next_run_timestamp_seconds),
            policy_state: Arc::new(policy_state),
            cpu_usage_percent: Arc::new(cpu_usage_percent),
            cpu_core_usage_percent: Arc::new(cpu_core_usage_percent),
            load_average: Arc::new(load_average),
            memory_total_bytes: Arc::new(memory_total_bytes),
            memory_used_bytes: Arc::new(memory_used_bytes),
            memory_available_bytes: Arc::new(memory_available_bytes),
            swap_total_bytes: Arc::new(swap_total_bytes),
            swap_used_bytes: Arc::new(swap_used_bytes),
            network_received_bytes: Arc::new(network_received_bytes),
            network_transmitted_bytes: Arc::new(network_transmitted_bytes),
            network_receive_rate_bytes: Arc::new(network_receive_rate_bytes),
            network_transmit_rate_bytes: Arc::new(network_transmit_rate_bytes),
            disk_io_read_bytes: Arc::new(disk_io_read_bytes),
            disk_io_written_bytes: Arc::new(disk_io_written_bytes),
            disk_io_read_rate_bytes: Arc::new(disk_io_read_rate_bytes),
            disk_io_write_rate_bytes: Arc::new(disk_io_write_rate_bytes),
            uptime_seconds: Arc::new(uptime_seconds),
            events_total: Arc::new(events_total),
            events_dropped_total: Arc::new(events_dropped_total),
            monitor_ticks: Arc::new(monitor_ticks),
            up: Arc::new(up),
        })
    }

    /// Sets one labelled gauge.
    pub fn set_gauge(&self, gauge: &GaugeVec, labels: &[&str], value: f64) {
        gauge.with_label_values(labels).set(value);
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Clears every labelled gauge. Counters and scalar gauges keep their
    /// values.
    pub fn reset(&self) {
        self.pool_health.reset();
        self.pool_size_bytes.reset();
        self.pool_allocated_bytes.reset();
        self.pool_free_bytes.reset();
        self.dataset_used_bytes.reset();
        self.dataset_available_bytes.reset();
        self.disk_info.reset();
        self.disk_size_bytes.reset();
        self.disk_smart_healthy.reset();
        self.disk_temperature_celsius.reset();
        self.disk_power_on_hours.reset();
        self.disk_sector_errors.reset();
        self.policy_last_run_timestamp_seconds.reset();
        self.policy_next_run_timestamp_seconds.reset();
        self.policy_state.reset();
        self.cpu_core_usage_percent.reset();
        self.load_average.reset();
        self.network_received_bytes.reset();
        self.network_transmitted_bytes.reset();
        self.network_receive_rate_bytes.reset();
        self.network_transmit_rate_bytes.reset();
        self.disk_io_read_bytes.reset();
        self.disk_io_written_bytes.reset();
        self.disk_io_read_rate_bytes.reset();
        self.disk_io_write_rate_bytes.reset();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}
