//! Engine Events
//!
//! Immutable records describing state changes detected by the scanners and
//! the outcome of snapshot policy runs. Events are persisted through the
//! [`Store`](crate::store::Store) and fanned out by the [`EventBus`].
//!
//! # Example
//!
//! ```rust
//! use nas_engine::events::{Event, EventKind, Severity};
//! use serde_json::json;
//!
//! let event = Event::new(EventKind::DiskAdded)
//!     .with_severity(Severity::Info)
//!     .with_payload(json!({ "device": "/dev/sda" }));
//! assert_eq!(event.kind.as_str(), "disk-added");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

pub mod bus;

pub use bus::{Delivery, EventBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PoolHealthChanged,
    DiskAdded,
    DiskRemoved,
    SmartAlert,
    SnapshotCreated,
    SnapshotPruned,
    SnapshotFailed,
    PolicyReloaded,
    ScanFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::PoolHealthChanged,
        EventKind::DiskAdded,
        EventKind::DiskRemoved,
        EventKind::SmartAlert,
        EventKind::SnapshotCreated,
        EventKind::SnapshotPruned,
        EventKind::SnapshotFailed,
        EventKind::PolicyReloaded,
        EventKind::ScanFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PoolHealthChanged => "pool-health-changed",
            EventKind::DiskAdded => "disk-added",
            EventKind::DiskRemoved => "disk-removed",
            EventKind::SmartAlert => "smart-alert",
            EventKind::SnapshotCreated => "snapshot-created",
            EventKind::SnapshotPruned => "snapshot-pruned",
            EventKind::SnapshotFailed => "snapshot-failed",
            EventKind::PolicyReloaded => "policy-reloaded",
            EventKind::ScanFailed => "scan-failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub severity: Severity,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// An info-level event with an empty payload, stamped now.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            severity: Severity::Info,
            payload: Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Selects which events a subscription receives
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    kinds: Option<HashSet<EventKind>>,
    min_severity: Option<Severity>,
}

impl EventFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            min_severity: None,
        }
    }

    pub fn min_severity(severity: Severity) -> Self {
        Self {
            kinds: None,
            min_severity: Some(severity),
        }
    }

    pub fn and_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        let kind_ok = self
            .kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind));
        let severity_ok = self.min_severity.map_or(true, |min| event.severity >= min);
        kind_ok && severity_ok
    }
}
