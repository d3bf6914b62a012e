//! Block Device Inventory
//!
//! Enumerates disks through `lsblk -J -b`. Only whole disks are reported;
//! partitions are children in the lsblk tree and are ignored. Loop devices
//! are included only when enabled in configuration and ZFS volumes
//! (`zd*`) are always excluded since they are backed by a pool, not by
//! hardware.

use crate::error::{EngineError, Result};
use crate::exec::Executor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub mod smart;

pub use smart::{SmartData, SmartHealth, SmartProbe, SmartctlProbe};

const LSBLK_COLUMNS: &str = "NAME,PATH,MODEL,SERIAL,SIZE,ROTA,TYPE,TRAN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskTransport {
    Sata,
    Sas,
    Nvme,
    Usb,
    Loop,
    Unknown,
}

impl DiskTransport {
    fn from_lsblk(tran: Option<&str>, device_type: &str) -> Self {
        if device_type == "loop" {
            return DiskTransport::Loop;
        }
        match tran.map(str::to_ascii_lowercase).as_deref() {
            Some("sata") | Some("ata") => DiskTransport::Sata,
            Some("sas") | Some("scsi") => DiskTransport::Sas,
            Some("nvme") => DiskTransport::Nvme,
            Some("usb") => DiskTransport::Usb,
            _ => DiskTransport::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiskTransport::Sata => "sata",
            DiskTransport::Sas => "sas",
            DiskTransport::Nvme => "nvme",
            DiskTransport::Usb => "usb",
            DiskTransport::Loop => "loop",
            DiskTransport::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DiskTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block device keyed by its device path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub path: String,
    pub name: String,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub size_bytes: u64,
    pub transport: DiskTransport,
    pub rotational: bool,
}

impl DiskInfo {
    /// Minimal record, mostly useful for baselines and tests.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            path,
            name,
            model: None,
            serial: None,
            size_bytes: 0,
            transport: DiskTransport::Unknown,
            rotational: false,
        }
    }
}

#[derive(Clone)]
pub struct DiskInventory {
    executor: Arc<dyn Executor>,
    include_loop_devices: bool,
}

impl DiskInventory {
    pub fn new(executor: Arc<dyn Executor>, include_loop_devices: bool) -> Self {
        Self {
            executor,
            include_loop_devices,
        }
    }

    /// Current disks sorted by device path.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<DiskInfo>> {
        let stdout = self
            .executor
            .output(cancel, "lsblk", &["-J", "-b", "-o", LSBLK_COLUMNS])
            .await?;
        let mut disks = parse_lsblk(&stdout, self.include_loop_devices)?;
        disks.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Found {} disks", disks.len());
        Ok(disks)
    }
}

/// Parses `lsblk -J` output. A document that is not JSON at all fails; a
/// single device entry that does not fit is skipped.
pub fn parse_lsblk(output: &[u8], include_loop_devices: bool) -> Result<Vec<DiskInfo>> {
    let document: Value = serde_json::from_slice(output)?;
    let devices = document
        .get("blockdevices")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Parse("lsblk output has no blockdevices array".into()))?;

    let mut disks = Vec::with_capacity(devices.len());
    for device in devices {
        let entry: LsblkDevice = match serde_json::from_value(device.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping malformed lsblk entry {}: {}", device, e);
                continue;
            }
        };
        if let Some(disk) = entry.into_disk(include_loop_devices) {
            disks.push(disk);
        }
    }
    Ok(disks)
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    rota: Option<Value>,
    #[serde(rename = "type")]
    device_type: String,
    #[serde(default)]
    tran: Option<String>,
}

impl LsblkDevice {
    fn into_disk(self, include_loop_devices: bool) -> Option<DiskInfo> {
        match self.device_type.as_str() {
            "disk" => {}
            "loop" if include_loop_devices => {}
            _ => return None,
        }
        if self.name.starts_with("zd") {
            return None;
        }

        let transport = DiskTransport::from_lsblk(self.tran.as_deref(), &self.device_type);
        Some(DiskInfo {
            path: self
                .path
                .unwrap_or_else(|| format!("/dev/{}", self.name)),
            model: clean(self.model),
            serial: clean(self.serial),
            size_bytes: self.size.as_ref().and_then(value_as_u64).unwrap_or(0),
            rotational: self.rota.as_ref().map(value_as_bool).unwrap_or(false),
            transport,
            name: self.name,
        })
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Older util-linux releases print numbers and booleans as strings.
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_u64() == Some(1),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}
