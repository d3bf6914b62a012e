use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub system: SystemConfig,
    /// Policies inserted into the store at startup.
    #[serde(default)]
    pub policies: Vec<PolicySeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_refresh_interval")]
    pub metrics_refresh_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_base_interval")]
    pub base_interval_seconds: u64,
    #[serde(default = "default_smart_interval")]
    pub smart_interval_seconds: u64,
    /// Falls back to `smart_interval_seconds` when unset.
    #[serde(default)]
    pub smart_ttl_seconds: Option<u64>,
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold_celsius: i64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default)]
    pub include_loop_devices: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_tick")]
    pub tick_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// Size of the in-memory notification log; older events are evicted.
    #[serde(default = "default_retained_notifications")]
    pub retained_notifications: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_system_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicySeed {
    pub name: String,
    pub schedule: String,
    pub retention: String,
    pub datasets: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9110
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_base_interval() -> u64 {
    30
}

fn default_smart_interval() -> u64 {
    300
}

fn default_temperature_threshold() -> i64 {
    60
}

fn default_command_timeout() -> u64 {
    30
}

fn default_scheduler_tick() -> u64 {
    60
}

fn default_subscriber_capacity() -> usize {
    crate::events::bus::DEFAULT_CAPACITY
}

fn default_retained_notifications() -> usize {
    crate::store::memory::DEFAULT_RETAINED_NOTIFICATIONS
}

fn default_system_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
            events: EventsConfig::default(),
            system: SystemConfig::default(),
            policies: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
            metrics_refresh_seconds: default_refresh_interval(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_interval_seconds: default_base_interval(),
            smart_interval_seconds: default_smart_interval(),
            smart_ttl_seconds: None,
            temperature_threshold_celsius: default_temperature_threshold(),
            command_timeout_seconds: default_command_timeout(),
            include_loop_devices: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_scheduler_tick(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
            retained_notifications: default_retained_notifications(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_system_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs(self.base_interval_seconds)
    }

    pub fn smart_interval(&self) -> Duration {
        Duration::from_secs(self.smart_interval_seconds)
    }

    pub fn smart_ttl(&self) -> Duration {
        Duration::from_secs(self.smart_ttl_seconds.unwrap_or(self.smart_interval_seconds))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }
}

impl SystemConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("NAS_ENGINE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a loop spin or never fire.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.base_interval_seconds == 0 {
            anyhow::bail!("monitor.base_interval_seconds must be greater than zero");
        }
        if self.monitor.command_timeout_seconds == 0 {
            anyhow::bail!("monitor.command_timeout_seconds must be greater than zero");
        }
        if self.scheduler.tick_seconds == 0 {
            anyhow::bail!("scheduler.tick_seconds must be greater than zero");
        }
        if self.events.subscriber_capacity == 0 {
            anyhow::bail!("events.subscriber_capacity must be greater than zero");
        }
        if self.events.retained_notifications == 0 {
            anyhow::bail!("events.retained_notifications must be greater than zero");
        }
        if self.system.interval_seconds == 0 {
            anyhow::bail!("system.interval_seconds must be greater than zero");
        }
        Ok(())
    }
}
