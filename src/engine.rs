//! Engine Assembly
//!
//! Wires the executor, gateway, cache, scanners, monitors, scheduler and
//! event bus together from a [`Config`] and a [`Store`]. This is the only place
//! where concrete component types are chosen.

use crate::config::{Config, PolicySeed};
use crate::disk::{DiskInventory, SmartctlProbe};
use crate::error::Result;
use crate::events::EventBus;
use crate::exec::{Executor, SystemExecutor};
use crate::inventory::Inventory;
use crate::monitor::Monitor;
use crate::policy::PolicyService;
use crate::scan::{DiskScanner, Scanner, SmartScanner, ZfsScanner};
use crate::scheduler::Scheduler;
use crate::smart_cache::SmartCache;
use crate::store::{PolicyDraft, Store};
use crate::system::{SysinfoFetcher, SystemDataFetcher, SystemMonitor};
use crate::zfs::ZfsGateway;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Engine {
    store: Arc<dyn Store>,
    inventory: Arc<Inventory>,
    smart_cache: Arc<SmartCache>,
    bus: Arc<EventBus>,
    monitor: Arc<Monitor>,
    system: Arc<SystemMonitor>,
    system_interval: std::time::Duration,
    scheduler: Arc<Scheduler>,
    policies: PolicyService,
}

impl Engine {
    /// Builds an engine that runs real host commands.
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Self {
        let executor = Arc::new(SystemExecutor::new(config.monitor.command_timeout()));
        Self::with_executor(config, store, executor)
    }

    pub fn with_executor(
        config: &Config,
        store: Arc<dyn Store>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let gateway = ZfsGateway::new(Arc::clone(&executor));
        let disks = DiskInventory::new(Arc::clone(&executor), config.monitor.include_loop_devices);
        let smart_cache = Arc::new(SmartCache::new(Arc::new(SmartctlProbe::new(executor))));
        let inventory = Arc::new(Inventory::new());
        let bus = Arc::new(EventBus::new(
            Arc::clone(&store),
            config.events.subscriber_capacity,
        ));

        let scanners: Vec<Arc<dyn Scanner>> = vec![
            Arc::new(DiskScanner::new(
                disks,
                Arc::clone(&store),
                Arc::clone(&inventory),
                Arc::clone(&smart_cache),
            )),
            Arc::new(SmartScanner::new(
                Arc::clone(&smart_cache),
                Arc::clone(&inventory),
                Arc::clone(&store),
                config.monitor.smart_interval(),
                config.monitor.smart_ttl(),
                config.monitor.temperature_threshold_celsius,
            )),
            Arc::new(ZfsScanner::new(gateway.clone(), Arc::clone(&inventory))),
        ];
        let monitor = Arc::new(Monitor::new(
            scanners,
            Arc::clone(&bus),
            config.monitor.base_interval(),
        ));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            gateway,
            Arc::clone(&bus),
            config.scheduler.tick(),
        ));
        let policies = PolicyService::new(Arc::clone(&store), Arc::clone(&scheduler));
        let system = Arc::new(SystemMonitor::new(
            Arc::new(SysinfoFetcher::new()),
            config.system.interval(),
        ));

        Self {
            store,
            inventory,
            smart_cache,
            bus,
            monitor,
            system,
            system_interval: config.system.interval(),
            scheduler,
            policies,
        }
    }

    /// Replaces the host stats source. Must be called before [`start`](Self::start).
    pub fn with_system_fetcher(mut self, fetcher: Arc<dyn SystemDataFetcher>) -> Self {
        self.system = Arc::new(SystemMonitor::new(fetcher, self.system_interval));
        self
    }

    /// Starts the monitors and the scheduler. Fails when the initial policy
    /// load fails.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        self.scheduler.start(cancel).await?;
        self.monitor.start(cancel);
        self.system.start(cancel);
        info!("Engine started");
        Ok(())
    }

    /// Stops every loop and waits for in-flight work.
    pub async fn stop(&self) {
        self.monitor.stop().await;
        self.system.stop().await;
        self.scheduler.stop().await;
        info!("Engine stopped");
    }

    /// Creates every seed whose name is not taken yet. Returns how many
    /// were created.
    pub async fn seed_policies(&self, seeds: &[PolicySeed]) -> Result<usize> {
        let existing: Vec<String> = self
            .policies
            .list()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();

        let mut created = 0;
        for seed in seeds {
            if existing.contains(&seed.name) {
                continue;
            }
            let mut draft = PolicyDraft::new(
                seed.name.clone(),
                seed.schedule.clone(),
                seed.retention.clone(),
                seed.datasets.iter().cloned(),
            );
            draft.enabled = seed.enabled;
            self.policies.create(draft).await?;
            created += 1;
        }
        Ok(created)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    pub fn smart_cache(&self) -> &Arc<SmartCache> {
        &self.smart_cache
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn system(&self) -> &Arc<SystemMonitor> {
        &self.system
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn policies(&self) -> &PolicyService {
        &self.policies
    }
}
