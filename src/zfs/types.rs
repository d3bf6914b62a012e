//! ZFS Record Types
//!
//! Structured views of `zpool list` / `zfs list` rows. Values are parsed
//! from `-H -p` output, so sizes are exact byte counts and timestamps are
//! Unix seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pool health as reported in the `health` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolHealth {
    Online,
    Degraded,
    Faulted,
    Offline,
    Unavail,
    Removed,
    Unknown,
}

impl PoolHealth {
    /// Never fails: anything unrecognised maps to [`PoolHealth::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => PoolHealth::Online,
            "DEGRADED" => PoolHealth::Degraded,
            "FAULTED" => PoolHealth::Faulted,
            "OFFLINE" => PoolHealth::Offline,
            "UNAVAIL" => PoolHealth::Unavail,
            "REMOVED" => PoolHealth::Removed,
            _ => PoolHealth::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolHealth::Online => "ONLINE",
            PoolHealth::Degraded => "DEGRADED",
            PoolHealth::Faulted => "FAULTED",
            PoolHealth::Offline => "OFFLINE",
            PoolHealth::Unavail => "UNAVAIL",
            PoolHealth::Removed => "REMOVED",
            PoolHealth::Unknown => "UNKNOWN",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, PoolHealth::Online)
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub size: u64,
    pub allocated: u64,
    pub free: u64,
    pub health: PoolHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Filesystem,
    Volume,
    Snapshot,
}

impl DatasetType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "filesystem" => Some(DatasetType::Filesystem),
            "volume" => Some(DatasetType::Volume),
            "snapshot" => Some(DatasetType::Snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub kind: DatasetType,
    pub used: u64,
    pub available: u64,
    /// `None` for volumes and for `none`/`legacy`/`-` mountpoints.
    pub mountpoint: Option<String>,
}

impl Dataset {
    /// The pool component of the dataset name.
    pub fn pool(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }
}

/// A snapshot identified as `dataset@name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub dataset: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub used: u64,
}

impl SnapshotRef {
    pub fn new(dataset: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            name: name.into(),
            created_at: None,
            used: 0,
        }
    }

    /// Splits a `dataset@name` string. Returns `None` unless there is exactly
    /// one `@` with non-empty parts on both sides.
    pub fn parse_full_name(full_name: &str) -> Option<Self> {
        let (dataset, name) = full_name.split_once('@')?;
        if dataset.is_empty() || name.is_empty() || name.contains('@') {
            return None;
        }
        Some(Self::new(dataset, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}@{}", self.dataset, self.name)
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset, self.name)
    }
}
