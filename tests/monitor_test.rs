//! Monitor tests
//!
//! Uses hand-written scanners so tick behaviour can be observed directly.

use async_trait::async_trait;
use nas_engine::error::{EngineError, Result};
use nas_engine::events::{Delivery, Event, EventBus, EventFilter, EventKind, Severity};
use nas_engine::monitor::Monitor;
use nas_engine::scan::Scanner;
use nas_engine::store::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Emits one disk-added event per scan, or fails when told to
#[derive(Default)]
struct ScriptedScanner {
    scans: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

#[async_trait]
impl Scanner for ScriptedScanner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<Event>> {
        let n = self.scans.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(EngineError::Cancelled { program: "scripted".into() });
                }
            }
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::CommandFailed {
                program: "zpool".into(),
                code: Some(1),
                stdout: String::new(),
                stderr: "boom".into(),
            });
        }
        Ok(vec![
            Event::new(EventKind::DiskAdded).with_payload(json!({ "scan": n, "step": 0 })),
            Event::new(EventKind::DiskAdded).with_payload(json!({ "scan": n, "step": 1 })),
        ])
    }
}

fn monitor_with(scanners: Vec<Arc<dyn Scanner>>) -> (Monitor, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new(Arc::new(MemoryStore::new()), 256));
    let monitor = Monitor::new(scanners, bus.clone(), Duration::from_secs(30));
    (monitor, bus)
}

fn events(subscription: &mut nas_engine::events::Subscription) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(Delivery::Event(event)) = subscription.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_tick_publishes_scanner_events_in_order() {
    // Given: One scanner emitting two events
    let scanner = Arc::new(ScriptedScanner::default());
    let (monitor, bus) = monitor_with(vec![scanner]);
    let mut subscription = bus.subscribe(EventFilter::all());

    // When: Running one tick
    let healthy = monitor.tick(&CancellationToken::new()).await;

    // Then: Both events arrive in the order the scanner returned them
    assert!(healthy);
    let steps: Vec<_> = events(&mut subscription)
        .iter()
        .map(|e| e.payload["step"].clone())
        .collect();
    assert_eq!(steps, vec![json!(0), json!(1)]);
    assert_eq!(monitor.ticks(), 1);
}

#[tokio::test]
async fn test_failing_scanner_is_reported_and_others_still_run() {
    // Given: A failing scanner next to a healthy one
    let failing = Arc::new(ScriptedScanner::default());
    failing.failing.store(true, Ordering::SeqCst);
    let healthy = Arc::new(ScriptedScanner::default());
    let (monitor, bus) = monitor_with(vec![failing, healthy.clone()]);
    let mut subscription = bus.subscribe(EventFilter::all());

    // When: Ticking
    let ok = monitor.tick(&CancellationToken::new()).await;

    // Then: The tick is unhealthy, the failure is a scan-failed warning and
    // the healthy scanner's events still went out
    assert!(!ok);
    assert!(!monitor.last_tick_healthy());
    let events = events(&mut subscription);
    let failure = events
        .iter()
        .find(|e| e.kind == EventKind::ScanFailed)
        .expect("scan-failed event");
    assert_eq!(failure.severity, Severity::Warning);
    assert_eq!(failure.payload["scanner"], "scripted");
    assert_eq!(failure.payload["transient"], true);
    assert_eq!(
        events.iter().filter(|e| e.kind == EventKind::DiskAdded).count(),
        2
    );
    assert_eq!(healthy.scans.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_health_recovers_on_next_good_tick() {
    let scanner = Arc::new(ScriptedScanner::default());
    scanner.failing.store(true, Ordering::SeqCst);
    let (monitor, _bus) = monitor_with(vec![scanner.clone()]);
    let cancel = CancellationToken::new();

    monitor.tick(&cancel).await;
    assert!(!monitor.last_tick_healthy());

    scanner.failing.store(false, Ordering::SeqCst);
    monitor.tick(&cancel).await;
    assert!(monitor.last_tick_healthy());
}

#[tokio::test(start_paused = true)]
async fn test_loop_keeps_ticking_after_failures() {
    // Given: A running monitor whose only scanner always fails
    let scanner = Arc::new(ScriptedScanner::default());
    scanner.failing.store(true, Ordering::SeqCst);
    let (monitor, _bus) = monitor_with(vec![scanner.clone()]);
    let cancel = CancellationToken::new();

    // When: Three intervals pass
    monitor.start(&cancel);
    tokio::time::sleep(Duration::from_secs(61)).await;

    // Then: It ticked immediately and once per interval
    assert_eq!(scanner.scans.load(Ordering::SeqCst), 3);
    assert!(monitor.is_running());
    monitor.stop().await;
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_tick() {
    // Given: A scanner that takes 10 seconds
    let scanner = Arc::new(ScriptedScanner {
        delay: Some(Duration::from_secs(10)),
        ..Default::default()
    });
    let (monitor, _bus) = monitor_with(vec![scanner.clone()]);
    let cancel = CancellationToken::new();
    monitor.start(&cancel);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // When: Stopping mid-scan
    monitor.stop().await;

    // Then: The scan was cancelled cleanly and no further scans start
    assert_eq!(scanner.scans.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(scanner.scans.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_loop() {
    let scanner = Arc::new(ScriptedScanner::default());
    let (monitor, _bus) = monitor_with(vec![scanner.clone()]);
    let cancel = CancellationToken::new();
    monitor.start(&cancel);
    tokio::time::sleep(Duration::from_secs(1)).await;

    cancel.cancel();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(scanner.scans.load(Ordering::SeqCst), 1);
    monitor.stop().await;
}
