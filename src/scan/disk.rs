use super::Scanner;
use crate::disk::{DiskInfo, DiskInventory};
use crate::error::Result;
use crate::events::{Event, EventKind, Severity};
use crate::inventory::Inventory;
use crate::smart_cache::SmartCache;
use crate::store::Store;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Detects disks appearing and disappearing, keyed by device path.
///
/// The baseline is loaded from the store on the first scan, so a restart
/// only reports disks that changed while the daemon was down.
pub struct DiskScanner {
    disks: DiskInventory,
    store: Arc<dyn Store>,
    inventory: Arc<Inventory>,
    cache: Arc<SmartCache>,
    baseline: Mutex<Option<BTreeMap<String, DiskInfo>>>,
}

impl DiskScanner {
    pub fn new(
        disks: DiskInventory,
        store: Arc<dyn Store>,
        inventory: Arc<Inventory>,
        cache: Arc<SmartCache>,
    ) -> Self {
        Self {
            disks,
            store,
            inventory,
            cache,
            baseline: Mutex::new(None),
        }
    }

    async fn load_baseline(&self) -> BTreeMap<String, DiskInfo> {
        match self.store.load_disk_baseline().await {
            Ok(Some(disks)) => disks.into_iter().map(|d| (d.path.clone(), d)).collect(),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Failed to load disk baseline, starting empty: {}", e);
                BTreeMap::new()
            }
        }
    }
}

#[async_trait]
impl Scanner for DiskScanner {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<Event>> {
        let mut baseline = self.baseline.lock().await;
        let previous = match baseline.take() {
            Some(previous) => previous,
            None => self.load_baseline().await,
        };

        let current: BTreeMap<String, DiskInfo> = match self.disks.list(cancel).await {
            Ok(disks) => disks.into_iter().map(|d| (d.path.clone(), d)).collect(),
            Err(e) => {
                *baseline = Some(previous);
                return Err(e);
            }
        };

        let mut events = Vec::new();
        for (path, disk) in &current {
            if !previous.contains_key(path) {
                info!(device = %path, "Disk added");
                events.push(
                    Event::new(EventKind::DiskAdded).with_payload(disk_payload(disk)),
                );
            }
        }
        for (path, disk) in &previous {
            if !current.contains_key(path) {
                info!(device = %path, "Disk removed");
                self.cache.forget(path);
                events.push(
                    Event::new(EventKind::DiskRemoved)
                        .with_severity(Severity::Warning)
                        .with_payload(disk_payload(disk)),
                );
            }
        }

        let disks: Vec<DiskInfo> = current.values().cloned().collect();
        if let Err(e) = self.store.save_disk_baseline(&disks).await {
            warn!("Failed to persist disk baseline: {}", e);
        }
        self.inventory.replace_disks(disks);
        *baseline = Some(current);

        Ok(events)
    }
}

fn disk_payload(disk: &DiskInfo) -> serde_json::Value {
    json!({
        "device": disk.path,
        "name": disk.name,
        "model": disk.model,
        "serial": disk.serial,
        "size_bytes": disk.size_bytes,
        "transport": disk.transport,
    })
}
