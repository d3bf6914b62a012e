use super::Scanner;
use crate::disk::{SmartData, SmartHealth};
use crate::error::Result;
use crate::events::{Event, EventKind, Severity};
use crate::inventory::Inventory;
use crate::smart_cache::{ProbeFailure, SmartCache};
use crate::store::Store;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Probes SMART data for every inventoried disk once per cadence.
///
/// Invocations between rounds return immediately with no events. A round
/// probes through the [`SmartCache`], so readings younger than the TTL are
/// reused rather than re-running `smartctl`.
///
/// A device whose probe fails yields a warning alert carrying the error and
/// the health of its last good reading. If every probe in a round fails the
/// round itself fails, so the monitor reports it as a failed scan.
pub struct SmartScanner {
    cache: Arc<SmartCache>,
    inventory: Arc<Inventory>,
    store: Arc<dyn Store>,
    cadence: Duration,
    ttl: Duration,
    temperature_threshold: i64,
    last_round: Mutex<Option<Instant>>,
}

impl SmartScanner {
    pub fn new(
        cache: Arc<SmartCache>,
        inventory: Arc<Inventory>,
        store: Arc<dyn Store>,
        cadence: Duration,
        ttl: Duration,
        temperature_threshold: i64,
    ) -> Self {
        Self {
            cache,
            inventory,
            store,
            cadence,
            ttl,
            temperature_threshold,
            last_round: Mutex::new(None),
        }
    }

    fn evaluate(&self, reading: &SmartData) -> Option<Event> {
        let mut reasons = Vec::new();
        let mut severity = Severity::Info;

        match reading.health {
            SmartHealth::Passed => {}
            SmartHealth::Failed => {
                reasons.push("health check failed".to_string());
                severity = Severity::Critical;
            }
            SmartHealth::Unknown => {
                reasons.push("health verdict unavailable".to_string());
                severity = Severity::Warning;
            }
        }

        if let Some(temperature) = reading.temperature_celsius {
            if temperature >= self.temperature_threshold {
                reasons.push(format!(
                    "temperature {}°C at or above {}°C",
                    temperature, self.temperature_threshold
                ));
                severity = severity.max(Severity::Warning);
            }
        }

        if reasons.is_empty() {
            return None;
        }

        Some(
            Event::new(EventKind::SmartAlert)
                .with_severity(severity)
                .with_payload(json!({
                    "device": reading.device,
                    "health": reading.health,
                    "temperature_celsius": reading.temperature_celsius,
                    "reasons": reasons,
                })),
        )
    }

    fn unreadable(device: &str, failure: &ProbeFailure) -> Event {
        Event::new(EventKind::SmartAlert)
            .with_severity(Severity::Warning)
            .with_payload(json!({
                "device": device,
                "error": failure.error.to_string(),
                "stale_health": failure.stale.as_ref().map(|stale| stale.health),
            }))
    }
}

#[async_trait]
impl Scanner for SmartScanner {
    fn name(&self) -> &'static str {
        "smart"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<Event>> {
        let mut last_round = self.last_round.lock().await;
        if let Some(last) = *last_round {
            if last.elapsed() < self.cadence {
                return Ok(Vec::new());
            }
        }

        // Until the disk scanner has filled the inventory there is nothing
        // to probe, and the round is not counted.
        let disks = self.inventory.disks();
        if disks.is_empty() {
            return Ok(Vec::new());
        }
        *last_round = Some(Instant::now());
        debug!("SMART round over {} disks", disks.len());

        let mut events = Vec::new();
        let mut last_failure = None;
        let mut failed = 0;
        for disk in disks.iter() {
            let reading = match self.cache.get_or_probe(cancel, &disk.path, self.ttl).await {
                Ok(reading) => reading,
                Err(failure) => {
                    warn!(device = %disk.path, "SMART probe failed: {}", failure.error);
                    failed += 1;
                    events.push(Self::unreadable(&disk.path, &failure));
                    // A disk already known to be failing keeps alerting.
                    if let Some(stale) = failure.stale.as_ref() {
                        events.extend(self.evaluate(stale));
                    }
                    last_failure = Some(failure.error);
                    continue;
                }
            };

            if let Err(e) = self.store.save_smart_reading(&reading).await {
                warn!(device = %disk.path, "Failed to persist SMART reading: {}", e);
            }
            events.extend(self.evaluate(&reading));
        }

        if failed == disks.len() {
            if let Some(error) = last_failure {
                return Err(error);
            }
        }

        Ok(events)
    }
}
