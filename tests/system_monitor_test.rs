//! System monitor tests
//!
//! Drives the monitor with a scripted fetcher on a paused clock so rates
//! and sampling intervals are exact.

use nas_engine::collectors::{collect_system_metrics, CollectionContext, CollectionStatus};
use nas_engine::config::Config;
use nas_engine::engine::Engine;
use nas_engine::error::{EngineError, Result};
use nas_engine::exec::FakeExecutor;
use nas_engine::metrics::MetricsCollector;
use nas_engine::store::MemoryStore;
use nas_engine::system::{
    CpuSample, DiskCounters, HostInfo, InterfaceCounters, LoadAverage, MemoryStats,
    SystemDataFetcher, SystemMonitor,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(10);

/// Reports fixed host values; byte counters grow by `step` per call
#[derive(Default)]
struct ScriptedFetcher {
    calls: AtomicUsize,
    network_bytes: AtomicU64,
    disk_bytes: AtomicU64,
    step: u64,
    memory_failing: AtomicBool,
    used_memory: AtomicU64,
}

impl ScriptedFetcher {
    fn growing_by(step: u64) -> Self {
        Self {
            step,
            used_memory: AtomicU64::new(2_000_000_000),
            ..Default::default()
        }
    }
}

impl SystemDataFetcher for ScriptedFetcher {
    fn cpu(&self) -> Result<CpuSample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CpuSample {
            global_percent: 12.5,
            per_core_percent: vec![10.0, 15.0],
            load_average: LoadAverage {
                one: 0.5,
                five: 0.25,
                fifteen: 0.125,
            },
        })
    }

    fn memory(&self) -> Result<MemoryStats> {
        if self.memory_failing.load(Ordering::SeqCst) {
            return Err(EngineError::Io(std::io::Error::other("meminfo unreadable")));
        }
        Ok(MemoryStats {
            total_bytes: 8_000_000_000,
            used_bytes: self.used_memory.load(Ordering::SeqCst),
            available_bytes: 6_000_000_000,
            free_bytes: 5_000_000_000,
            swap_total_bytes: 1_000_000_000,
            swap_used_bytes: 0,
        })
    }

    fn network(&self) -> Result<Vec<InterfaceCounters>> {
        let bytes = self.network_bytes.fetch_add(self.step, Ordering::SeqCst) + self.step;
        Ok(vec![InterfaceCounters {
            name: "eth0".into(),
            rx_bytes: bytes,
            tx_bytes: bytes / 2,
        }])
    }

    fn disk_io(&self) -> Result<Vec<DiskCounters>> {
        let bytes = self.disk_bytes.fetch_add(self.step, Ordering::SeqCst) + self.step;
        Ok(vec![DiskCounters {
            name: "sda".into(),
            read_bytes: bytes,
            write_bytes: bytes * 2,
        }])
    }

    fn host(&self) -> Result<HostInfo> {
        Ok(HostInfo {
            hostname: "nas01".into(),
            os: "Linux".into(),
            kernel: "6.6.0".into(),
            uptime_seconds: 3600,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_sample_fills_stats_without_rates() {
    // Given: A monitor that has never sampled
    let fetcher = Arc::new(ScriptedFetcher::growing_by(1000));
    let monitor = SystemMonitor::new(fetcher, INTERVAL);
    assert!(monitor.stats().collected_at.is_none());

    // When: Taking one sample
    monitor.sample();

    // Then: Every section is filled and rates need a second sample
    let stats = monitor.stats();
    assert!(stats.collected_at.is_some());
    assert_eq!(stats.cpu.global_percent, 12.5);
    assert_eq!(stats.cpu.per_core_percent.len(), 2);
    assert_eq!(stats.memory.total_bytes, 8_000_000_000);
    assert_eq!(stats.host.hostname, "nas01");
    assert_eq!(stats.network["eth0"].rx_bytes, 1000);
    assert_eq!(stats.network["eth0"].rx_bytes_per_second, 0);
    assert_eq!(stats.disk_io["sda"].write_bytes, 2000);
    assert_eq!(monitor.samples(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rates_are_bytes_per_second_between_samples() {
    // Given: Counters that grow by 5000 bytes per sample
    let fetcher = Arc::new(ScriptedFetcher::growing_by(5000));
    let monitor = SystemMonitor::new(fetcher, INTERVAL);
    monitor.sample();

    // When: Sampling again ten seconds later
    tokio::time::advance(INTERVAL).await;
    monitor.sample();

    // Then: Rates are the growth over the elapsed time
    let stats = monitor.stats();
    assert_eq!(stats.network["eth0"].rx_bytes_per_second, 500);
    assert_eq!(stats.network["eth0"].tx_bytes_per_second, 250);
    assert_eq!(stats.disk_io["sda"].read_bytes_per_second, 500);
    assert_eq!(stats.disk_io["sda"].write_bytes_per_second, 1000);
}

#[tokio::test(start_paused = true)]
async fn test_failed_part_keeps_its_previous_value() {
    // Given: A sample taken while memory was readable
    let fetcher = Arc::new(ScriptedFetcher::growing_by(1000));
    let monitor = SystemMonitor::new(fetcher.clone(), INTERVAL);
    monitor.sample();

    // When: Memory becomes unreadable and usage would have changed
    fetcher.memory_failing.store(true, Ordering::SeqCst);
    fetcher.used_memory.store(7_000_000_000, Ordering::SeqCst);
    tokio::time::advance(INTERVAL).await;
    monitor.sample();

    // Then: Memory stays at the last good value while the rest moves on
    let stats = monitor.stats();
    assert_eq!(stats.memory.used_bytes, 2_000_000_000);
    assert_eq!(stats.network["eth0"].rx_bytes, 2000);
    assert_eq!(monitor.samples(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_loop_samples_immediately_then_per_interval() {
    // Given: A started monitor
    let fetcher = Arc::new(ScriptedFetcher::growing_by(1000));
    let monitor = SystemMonitor::new(fetcher.clone(), INTERVAL);
    let cancel = CancellationToken::new();
    monitor.start(&cancel);

    // When: Just over two intervals pass
    tokio::time::sleep(Duration::from_secs(21)).await;

    // Then: It sampled at start and once per interval
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    assert!(monitor.is_running());

    // And: Stopping ends the loop for good
    monitor.stop().await;
    assert!(!monitor.is_running());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_sampling() {
    let fetcher = Arc::new(ScriptedFetcher::growing_by(1000));
    let monitor = SystemMonitor::new(fetcher.clone(), INTERVAL);
    let cancel = CancellationToken::new();
    monitor.start(&cancel);
    tokio::time::sleep(Duration::from_secs(1)).await;

    cancel.cancel();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    monitor.stop().await;
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

fn engine_with(fetcher: Arc<ScriptedFetcher>) -> Engine {
    Engine::with_executor(
        &Config::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(FakeExecutor::new()),
    )
    .with_system_fetcher(fetcher)
}

#[tokio::test]
async fn test_collector_exports_latest_sample() {
    // Given: An engine whose system monitor has sampled once
    let engine = engine_with(Arc::new(ScriptedFetcher::growing_by(1000)));
    engine.system().sample();
    let metrics = MetricsCollector::new().expect("Failed to create metrics");

    // When: Collecting host metrics
    let ctx = CollectionContext {
        engine: &engine,
        metrics: &metrics,
    };
    let status = collect_system_metrics(&ctx).unwrap();

    // Then: CPU, memory, network and disk gauges are exported
    assert_eq!(status, CollectionStatus::Success);
    let rendered = metrics.render().unwrap();
    assert!(rendered.contains("nas_cpu_usage_percent 12.5"));
    assert!(rendered.contains(r#"nas_cpu_core_usage_percent{core="1"} 15"#));
    assert!(rendered.contains(r#"nas_load_average{period="1m"} 0.5"#));
    assert!(rendered.contains("nas_memory_total_bytes 8000000000"));
    assert!(rendered.contains("nas_memory_used_bytes 2000000000"));
    assert!(rendered.contains("nas_swap_total_bytes 1000000000"));
    assert!(rendered.contains(r#"nas_network_received_bytes{interface="eth0"} 1000"#));
    assert!(rendered.contains(r#"nas_disk_io_written_bytes{device="sda"} 2000"#));
    assert!(rendered.contains("nas_uptime_seconds 3600"));
}

#[tokio::test]
async fn test_collector_before_first_sample_reports_failed() {
    let engine = engine_with(Arc::new(ScriptedFetcher::growing_by(1000)));
    let metrics = MetricsCollector::new().expect("Failed to create metrics");
    let ctx = CollectionContext {
        engine: &engine,
        metrics: &metrics,
    };

    let status = collect_system_metrics(&ctx).unwrap();

    assert_eq!(status, CollectionStatus::Failed);
    assert!(!metrics.render().unwrap().contains("nas_load_average{"));
}
