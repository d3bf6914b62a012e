//! Monitor
//!
//! Drives every registered [`Scanner`] from one base interval.
//!
//! # Tick Semantics
//!
//! - The first tick fires immediately after [`Monitor::start`].
//! - Scanners of one tick run concurrently. Each scanner's events are
//!   published in the order it returned them.
//! - A failing scanner is logged and reported as a `scan-failed` warning;
//!   the other scanners and the loop carry on.
//! - Ticks never overlap: the loop awaits each tick and skips timer ticks
//!   missed while a slow tick was running.
//! - [`Monitor::stop`] cancels the loop and waits for the in-flight tick.

use crate::error::EngineError;
use crate::events::{Event, EventBus, EventKind, Severity};
use crate::scan::Scanner;
use futures_util::future::join_all;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct MonitorState {
    scanners: Vec<Arc<dyn Scanner>>,
    bus: Arc<EventBus>,
    healthy: AtomicBool,
    ticks: AtomicU64,
}

pub struct Monitor {
    state: Arc<MonitorState>,
    interval: Duration,
    span: Span,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(scanners: Vec<Arc<dyn Scanner>>, bus: Arc<EventBus>, interval: Duration) -> Self {
        Self {
            state: Arc::new(MonitorState {
                scanners,
                bus,
                healthy: AtomicBool::new(true),
                ticks: AtomicU64::new(0),
            }),
            interval,
            span: info_span!("monitor"),
            running: Mutex::new(None),
        }
    }

    /// Spawns the tick loop and returns immediately. The loop stops when
    /// `parent` is cancelled or [`stop`](Self::stop) is called.
    pub fn start(&self, parent: &CancellationToken) {
        let mut running = self.lock_running();
        if running.is_some() {
            warn!(parent: &self.span, "Monitor already running");
            return;
        }

        let cancel = parent.child_token();
        let state = Arc::clone(&self.state);
        let interval = self.interval;
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(
            async move {
                info!(interval_secs = interval.as_secs(), "Monitor started");
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = loop_cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            state.tick(&loop_cancel).await;
                        }
                    }
                }
                info!("Monitor stopped");
            }
            .instrument(self.span.clone()),
        );

        *running = Some(Running { cancel, handle });
    }

    /// Cancels the loop and waits for the in-flight tick to finish.
    pub async fn stop(&self) {
        let running = self.lock_running().take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(parent: &self.span, "Monitor task ended abnormally: {}", e);
            }
        }
    }

    /// Runs a single tick outside the loop. Returns whether every scanner
    /// succeeded.
    pub async fn tick(&self, cancel: &CancellationToken) -> bool {
        self.state.tick(cancel).instrument(self.span.clone()).await
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Whether every scanner succeeded on the most recent tick.
    pub fn last_tick_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::SeqCst)
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MonitorState {
    async fn tick(&self, cancel: &CancellationToken) -> bool {
        let scans = self.scanners.iter().map(|scanner| {
            let scanner = Arc::clone(scanner);
            async move {
                let result = scanner.scan(cancel).await;
                self.publish_outcome(scanner.name(), result, cancel).await
            }
        });
        let outcomes = join_all(scans).await;

        let healthy = outcomes.iter().all(|ok| *ok);
        self.healthy.store(healthy, Ordering::SeqCst);
        self.ticks.fetch_add(1, Ordering::SeqCst);
        debug!(healthy, "Monitor tick complete");
        healthy
    }

    async fn publish_outcome(
        &self,
        scanner: &'static str,
        result: crate::error::Result<Vec<Event>>,
        cancel: &CancellationToken,
    ) -> bool {
        match result {
            Ok(events) => {
                self.bus.publish_all(events).await;
                true
            }
            Err(EngineError::Cancelled { .. }) if cancel.is_cancelled() => {
                debug!(scanner, "Scan cancelled by shutdown");
                true
            }
            Err(e) => {
                warn!(scanner, "Scan failed: {}", e);
                self.bus
                    .publish(
                        Event::new(EventKind::ScanFailed)
                            .with_severity(Severity::Warning)
                            .with_payload(json!({
                                "scanner": scanner,
                                "error": e.to_string(),
                                "transient": e.is_transient(),
                            })),
                    )
                    .await;
                false
            }
        }
    }
}
