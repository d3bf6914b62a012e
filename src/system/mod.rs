//! System Monitor
//!
//! Samples host resource usage (CPU, memory and swap, network and disk I/O)
//! on its own interval, independent of the scanner loop, and keeps the
//! latest [`SystemStats`] for readers.
//!
//! # Sampling
//!
//! - The first sample is taken immediately after [`SystemMonitor::start`].
//! - Each part of a sample is fetched separately. A part that fails is
//!   logged and keeps its previous value; the rest are still updated.
//! - Network and disk rates are bytes per second since the previous sample.
//!   A counter that went backwards (interface reset, device replaced)
//!   yields a rate of zero for that sample.

mod host;

pub use host::{parse_diskstats, SysinfoFetcher};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Source of raw host counters. Implementations must not block for long;
/// every call runs on the monitor task.
pub trait SystemDataFetcher: Send + Sync {
    fn cpu(&self) -> Result<CpuSample>;
    fn memory(&self) -> Result<MemoryStats>;
    fn network(&self) -> Result<Vec<InterfaceCounters>>;
    fn disk_io(&self) -> Result<Vec<DiskCounters>>;
    fn host(&self) -> Result<HostInfo>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuSample {
    pub global_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub load_average: LoadAverage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub free_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

/// Cumulative byte counters of one network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Cumulative byte counters of one block device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCounters {
    pub name: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_bytes_per_second: u64,
    pub tx_bytes_per_second: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskIoStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_bytes_per_second: u64,
    pub write_bytes_per_second: u64,
}

/// Latest host resource usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu: CpuSample,
    pub memory: MemoryStats,
    pub network: BTreeMap<String, InterfaceStats>,
    pub disk_io: BTreeMap<String, DiskIoStats>,
    pub host: HostInfo,
    /// `None` until the first sample
    pub collected_at: Option<DateTime<Utc>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Latest {
    stats: SystemStats,
    sampled_at: Option<Instant>,
}

struct SystemState {
    fetcher: Arc<dyn SystemDataFetcher>,
    latest: RwLock<Latest>,
    samples: AtomicU64,
}

pub struct SystemMonitor {
    state: Arc<SystemState>,
    interval: Duration,
    span: Span,
    running: Mutex<Option<Running>>,
}

impl SystemMonitor {
    pub fn new(fetcher: Arc<dyn SystemDataFetcher>, interval: Duration) -> Self {
        Self {
            state: Arc::new(SystemState {
                fetcher,
                latest: RwLock::new(Latest {
                    stats: SystemStats::default(),
                    sampled_at: None,
                }),
                samples: AtomicU64::new(0),
            }),
            interval,
            span: info_span!("system_monitor"),
            running: Mutex::new(None),
        }
    }

    /// Spawns the sampling loop. It stops when `parent` is cancelled or
    /// [`stop`](Self::stop) is called.
    pub fn start(&self, parent: &CancellationToken) {
        let mut running = self.lock_running();
        if running.is_some() {
            warn!(parent: &self.span, "System monitor already running");
            return;
        }

        let cancel = parent.child_token();
        let state = Arc::clone(&self.state);
        let interval = self.interval;
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(
            async move {
                info!(interval_secs = interval.as_secs(), "System monitor started");
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = loop_cancel.cancelled() => break,
                        _ = ticker.tick() => state.sample(),
                    }
                }
                info!("System monitor stopped");
            }
            .instrument(self.span.clone()),
        );

        *running = Some(Running { cancel, handle });
    }

    pub async fn stop(&self) {
        let running = self.lock_running().take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(parent: &self.span, "System monitor task ended abnormally: {}", e);
            }
        }
    }

    /// Takes one sample outside the loop.
    pub fn sample(&self) {
        let _guard = self.span.enter();
        self.state.sample();
    }

    /// A copy of the latest stats.
    pub fn stats(&self) -> SystemStats {
        self.state.read_latest().stats.clone()
    }

    pub fn samples(&self) -> u64 {
        self.state.samples.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SystemState {
    fn sample(&self) {
        let fetcher = self.fetcher.as_ref();
        let cpu = logged("cpu", fetcher.cpu());
        let memory = logged("memory", fetcher.memory());
        let network = logged("network", fetcher.network());
        let disk_io = logged("disk I/O", fetcher.disk_io());
        let host = logged("host", fetcher.host());
        let now = Instant::now();

        let mut latest = self
            .latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let elapsed = latest.sampled_at.map(|at| now.duration_since(at));
        let stats = &mut latest.stats;

        if let Some(cpu) = cpu {
            stats.cpu = cpu;
        }
        if let Some(memory) = memory {
            stats.memory = memory;
        }
        if let Some(host) = host {
            stats.host = host;
        }
        if let Some(network) = network {
            stats.network = network
                .into_iter()
                .map(|counters| {
                    let previous = stats.network.get(&counters.name);
                    let interface = InterfaceStats {
                        rx_bytes: counters.rx_bytes,
                        tx_bytes: counters.tx_bytes,
                        rx_bytes_per_second: rate(
                            previous.map(|p| p.rx_bytes),
                            counters.rx_bytes,
                            elapsed,
                        ),
                        tx_bytes_per_second: rate(
                            previous.map(|p| p.tx_bytes),
                            counters.tx_bytes,
                            elapsed,
                        ),
                    };
                    (counters.name, interface)
                })
                .collect();
        }
        if let Some(disks) = disk_io {
            stats.disk_io = disks
                .into_iter()
                .map(|counters| {
                    let previous = stats.disk_io.get(&counters.name);
                    let disk = DiskIoStats {
                        read_bytes: counters.read_bytes,
                        write_bytes: counters.write_bytes,
                        read_bytes_per_second: rate(
                            previous.map(|p| p.read_bytes),
                            counters.read_bytes,
                            elapsed,
                        ),
                        write_bytes_per_second: rate(
                            previous.map(|p| p.write_bytes),
                            counters.write_bytes,
                            elapsed,
                        ),
                    };
                    (counters.name, disk)
                })
                .collect();
        }

        stats.collected_at = Some(Utc::now());
        latest.sampled_at = Some(now);
        self.samples.fetch_add(1, Ordering::SeqCst);
        debug!("System sample taken");
    }

    fn read_latest(&self) -> std::sync::RwLockReadGuard<'_, Latest> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn logged<T>(part: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to read {} stats: {}", part, e);
            None
        }
    }
}

/// Bytes per second between two cumulative readings. Zero without a previous
/// reading, without elapsed time, or when the counter went backwards.
fn rate(previous: Option<u64>, current: u64, elapsed: Option<Duration>) -> u64 {
    let (Some(previous), Some(elapsed)) = (previous, elapsed) else {
        return 0;
    };
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 || current < previous {
        return 0;
    }
    ((current - previous) as f64 / seconds) as u64
}
