//! NAS Monitoring & Scheduling Engine
//!
//! Watches a ZFS-based storage host and keeps scheduled snapshots of its
//! datasets.
//!
//! # Overview
//!
//! The engine periodically scans disks, SMART health and ZFS pools, turns
//! differences into events, and fans those events out to subscribers after
//! persisting them. Alongside it, a scheduler creates snapshots for
//! user-defined policies and prunes the ones that fall out of retention.
//! Every host interaction goes through an external command (`zpool`, `zfs`,
//! `lsblk`, `smartctl`) behind a replaceable executor. A separate system
//! monitor samples host resource usage for the metrics endpoint.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────┐  events   ┌───────────┐   persist   ┌───────┐
//!  ┌─────────┐    │ Monitor  │ ────────► │ Event Bus │ ──────────► │ Store │
//!  │Scanners │ ◄─ │ (ticks)  │           └─────┬─────┘             └───────┘
//!  └────┬────┘    └──────────┘                 │ fan-out               ▲
//!       │                                      ▼                       │
//!       │         ┌──────────┐           subscribers          policies │
//!       │         │Scheduler │ ────────────────────────────────────────┘
//!       │         └────┬─────┘
//!       ▼              ▼
//!  ┌─────────────────────────┐
//!  │ Gateway / Inventory /   │ ──► Executor ──► zpool, zfs, lsblk, smartctl
//!  │ SMART cache             │
//!  └─────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`exec`] - Command executor with timeout and cancellation
//! - [`zfs`] - ZFS gateway (pools, datasets, snapshots)
//! - [`disk`] - Block device inventory and SMART probing
//! - [`smart_cache`] - TTL cache in front of SMART probes
//! - [`inventory`] - Latest known pools, datasets and disks
//! - [`scan`] - Disk, SMART and ZFS scanners
//! - [`monitor`] - Periodic scanner driver
//! - [`system`] - CPU, memory, network and disk I/O sampling
//! - [`events`] - Event model and bus
//! - [`store`] - Persistence contract and in-memory store
//! - [`scheduler`] - Snapshot policy scheduler
//! - [`policy`] - Policy validation and CRUD
//! - [`engine`] - Wiring of all components
//! - [`metrics`], [`collectors`], [`server`] - Prometheus surface
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use nas_engine::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod disk;
pub mod engine;
pub mod error;
pub mod events;
pub mod exec;
pub mod inventory;
pub mod metrics;
pub mod monitor;
pub mod policy;
pub mod scan;
pub mod scheduler;
pub mod server;
pub mod smart_cache;
pub mod store;
pub mod system;
pub mod zfs;
