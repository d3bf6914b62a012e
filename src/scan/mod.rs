//! Scanners
//!
//! A scanner inspects one domain of host state, compares it with what it saw
//! last time and returns the resulting change events. Scanners never publish
//! on their own: the [`Monitor`](crate::monitor::Monitor) publishes whatever
//! they return, in order.
//!
//! # Cadence
//!
//! Every scanner is invoked on each monitor tick. Scanners with expensive
//! work ([`SmartScanner`]) track their own cadence and return an empty list
//! until it has elapsed.
//!
//! # Baselines
//!
//! Each scanner keeps its previous view under a `tokio::sync::Mutex` held for
//! the whole scan, so two overlapping invocations are serialized rather than
//! diffing against a half-updated baseline.

use crate::error::Result;
use crate::events::Event;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod disk;
pub mod smart;
pub mod zfs;

pub use disk::DiskScanner;
pub use smart::SmartScanner;
pub use zfs::ZfsScanner;

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Short identifier used in logs and scan-failed events.
    fn name(&self) -> &'static str;

    /// Returns the events detected by this scan in detection order.
    async fn scan(&self, cancel: &CancellationToken) -> Result<Vec<Event>>;
}
