//! SMART probing via `smartctl -a -j`.
//!
//! smartctl encodes its exit status as a bitmask. Bits 0-2 mean the command
//! line, device open or SMART command failed, so there is no usable data.
//! Bits 3-7 report problems with the disk itself and still come with a valid
//! JSON document, which is exactly the case worth alerting on.

use crate::error::{EngineError, Result};
use crate::exec::Executor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SMARTCTL: &str = "smartctl";
const FATAL_EXIT_BITS: i32 = 0b0000_0111;

const ATTR_REALLOCATED: u32 = 5;
const ATTR_TEMPERATURE: u32 = 194;
const ATTR_PENDING: u32 = 197;
const ATTR_UNCORRECTABLE: u32 = 198;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmartHealth {
    Passed,
    Failed,
    Unknown,
}

impl SmartHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartHealth::Passed => "passed",
            SmartHealth::Failed => "failed",
            SmartHealth::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartAttribute {
    pub id: u32,
    pub name: String,
    pub value: u64,
    pub worst: u64,
    pub threshold: u64,
    pub raw: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartData {
    pub device: String,
    pub health: SmartHealth,
    pub temperature_celsius: Option<i64>,
    pub power_on_hours: Option<u64>,
    pub reallocated_sectors: Option<u64>,
    pub pending_sectors: Option<u64>,
    pub uncorrectable_sectors: Option<u64>,
    pub attributes: Vec<SmartAttribute>,
    pub probed_at: DateTime<Utc>,
}

impl SmartData {
    /// A reading with no data besides the verdict.
    pub fn with_health(device: impl Into<String>, health: SmartHealth) -> Self {
        Self {
            device: device.into(),
            health,
            temperature_celsius: None,
            power_on_hours: None,
            reallocated_sectors: None,
            pending_sectors: None,
            uncorrectable_sectors: None,
            attributes: Vec::new(),
            probed_at: Utc::now(),
        }
    }

    pub fn is_passing(&self) -> bool {
        self.health == SmartHealth::Passed
    }
}

/// Source of SMART readings for a single device
#[async_trait]
pub trait SmartProbe: Send + Sync {
    async fn probe(&self, cancel: &CancellationToken, device: &str) -> Result<SmartData>;
}

pub struct SmartctlProbe {
    executor: Arc<dyn Executor>,
}

impl SmartctlProbe {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl SmartProbe for SmartctlProbe {
    async fn probe(&self, cancel: &CancellationToken, device: &str) -> Result<SmartData> {
        let output = self
            .executor
            .execute(cancel, SMARTCTL, &["-a", "-j", device])
            .await?;

        let fatal = match output.code {
            Some(code) => code & FATAL_EXIT_BITS != 0,
            None => true,
        };
        if fatal {
            return Err(EngineError::CommandFailed {
                program: SMARTCTL.to_string(),
                code: output.code,
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
            });
        }

        parse_smartctl(device, &output.stdout)
    }
}

/// Builds a [`SmartData`] from a `smartctl -j` document. Handles both the ATA
/// attribute table and the NVMe health log.
pub fn parse_smartctl(device: &str, output: &[u8]) -> Result<SmartData> {
    let doc: Value = serde_json::from_slice(output)?;
    if !doc.is_object() {
        return Err(EngineError::Parse(format!(
            "smartctl output for {device} is not a JSON object"
        )));
    }

    let health = match doc.pointer("/smart_status/passed").and_then(Value::as_bool) {
        Some(true) => SmartHealth::Passed,
        Some(false) => SmartHealth::Failed,
        None => SmartHealth::Unknown,
    };

    let attributes = parse_attributes(&doc);
    let raw_of = |id: u32| attributes.iter().find(|a| a.id == id).map(|a| a.raw);
    let nvme = |field: &str| {
        doc.pointer(&format!("/nvme_smart_health_information_log/{field}"))
            .and_then(Value::as_u64)
    };

    let temperature_celsius = doc
        .pointer("/temperature/current")
        .and_then(Value::as_i64)
        .or_else(|| {
            // Attribute 194 packs min/max into the upper bytes of the raw value.
            raw_of(ATTR_TEMPERATURE).map(|raw| (raw & 0xff) as i64)
        });

    let power_on_hours = doc
        .pointer("/power_on_time/hours")
        .and_then(Value::as_u64)
        .or_else(|| nvme("power_on_hours"));

    let reallocated_sectors = raw_of(ATTR_REALLOCATED);
    let pending_sectors = raw_of(ATTR_PENDING);
    let uncorrectable_sectors = raw_of(ATTR_UNCORRECTABLE).or_else(|| nvme("media_errors"));

    Ok(SmartData {
        device: device.to_string(),
        health,
        temperature_celsius,
        power_on_hours,
        reallocated_sectors,
        pending_sectors,
        uncorrectable_sectors,
        attributes,
        probed_at: Utc::now(),
    })
}

fn parse_attributes(doc: &Value) -> Vec<SmartAttribute> {
    let Some(table) = doc
        .pointer("/ata_smart_attributes/table")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    table
        .iter()
        .filter_map(|row| {
            Some(SmartAttribute {
                id: u32::try_from(row.get("id")?.as_u64()?).ok()?,
                name: row.get("name")?.as_str()?.to_string(),
                value: row.get("value").and_then(Value::as_u64).unwrap_or(0),
                worst: row.get("worst").and_then(Value::as_u64).unwrap_or(0),
                threshold: row.get("thresh").and_then(Value::as_u64).unwrap_or(0),
                raw: row.pointer("/raw/value").and_then(Value::as_u64).unwrap_or(0),
            })
        })
        .collect()
}
