use super::Scanner;
use crate::error::Result;
use crate::events::{Event, EventKind, Severity};
use crate::inventory::Inventory;
use crate::zfs::{PoolHealth, ZfsGateway};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tracks pool health transitions and refreshes pool/dataset inventory.
pub struct ZfsScanner {
    gateway: ZfsGateway,
    inventory: Arc<Inventory>,
    baseline: Mutex<HashMap<String, PoolHealth>>,
}

impl ZfsScanner {
    pub fn new(gateway: ZfsGateway, inventory: Arc<Inventory>) -> Self {
        Self {
            gateway,
            inventory,
            baseline: Mutex::new(HashMap::new()),
        }
    }
}

fn severity_for(health: PoolHealth) -> Severity {
    match health {
        PoolHealth::Online => Severity::Info,
        PoolHealth::Degraded | PoolHealth::Offline | PoolHealth::Unknown => Severity::Warning,
        PoolHealth::Faulted | PoolHealth::Unavail | PoolHealth::Removed => Severity::Critical,
    }
}

#[async_trait]
impl Scanner for ZfsScanner {
    fn name(&self) -> &'static str {
        "zfs"
    }

    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<Event>> {
        let mut baseline = self.baseline.lock().await;
        let pools = self.gateway.list_pools(cancel).await?;

        let mut events = Vec::new();
        for pool in &pools {
            let previous = baseline.get(&pool.name).copied();
            let changed = match previous {
                Some(previous) => previous != pool.health,
                None => !pool.health.is_online(),
            };
            if changed {
                info!(pool = %pool.name, ?previous, current = %pool.health, "Pool health changed");
                events.push(
                    Event::new(EventKind::PoolHealthChanged)
                        .with_severity(severity_for(pool.health))
                        .with_payload(json!({
                            "pool": pool.name,
                            "previous": previous,
                            "current": pool.health,
                        })),
                );
            }
        }

        *baseline = pools.iter().map(|p| (p.name.clone(), p.health)).collect();
        self.inventory.replace_pools(pools);

        match self.gateway.list_datasets(cancel).await {
            Ok(datasets) => self.inventory.replace_datasets(datasets),
            Err(e) => warn!("Dataset listing failed, keeping previous inventory: {}", e),
        }

        Ok(events)
    }
}
