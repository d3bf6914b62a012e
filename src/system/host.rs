//! [`SystemDataFetcher`] backed by the `sysinfo` crate.
//!
//! Disk I/O counters are not exposed by `sysinfo`, so they are read from
//! `/proc/diskstats` directly. On hosts without that file the disk section
//! of the stats stays empty.

use super::{
    CpuSample, DiskCounters, HostInfo, InterfaceCounters, LoadAverage, MemoryStats,
    SystemDataFetcher,
};
use crate::error::{EngineError, Result};
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Networks, System};

const DISKSTATS: &str = "/proc/diskstats";

/// `/proc/diskstats` counts in 512-byte sectors regardless of the device.
const SECTOR_BYTES: u64 = 512;

pub struct SysinfoFetcher {
    system: Mutex<System>,
    networks: Mutex<Networks>,
}

impl SysinfoFetcher {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta against the previous refresh; prime it so the
        // first sample is not all zeros.
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    fn lock_system(&self) -> MutexGuard<'_, System> {
        self.system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SysinfoFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemDataFetcher for SysinfoFetcher {
    fn cpu(&self) -> Result<CpuSample> {
        let mut system = self.lock_system();
        system.refresh_cpu();

        let load = System::load_average();
        Ok(CpuSample {
            global_percent: f64::from(system.global_cpu_info().cpu_usage()),
            per_core_percent: system
                .cpus()
                .iter()
                .map(|cpu| f64::from(cpu.cpu_usage()))
                .collect(),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        })
    }

    fn memory(&self) -> Result<MemoryStats> {
        let mut system = self.lock_system();
        system.refresh_memory();

        Ok(MemoryStats {
            total_bytes: system.total_memory(),
            used_bytes: system.used_memory(),
            available_bytes: system.available_memory(),
            free_bytes: system.free_memory(),
            swap_total_bytes: system.total_swap(),
            swap_used_bytes: system.used_swap(),
        })
    }

    fn network(&self) -> Result<Vec<InterfaceCounters>> {
        let mut networks = self
            .networks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        networks.refresh_list();

        Ok(networks
            .list()
            .iter()
            .map(|(name, data)| InterfaceCounters {
                name: name.clone(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect())
    }

    fn disk_io(&self) -> Result<Vec<DiskCounters>> {
        let content = std::fs::read_to_string(DISKSTATS)?;
        Ok(parse_diskstats(&content))
    }

    fn host(&self) -> Result<HostInfo> {
        let hostname = System::host_name()
            .ok_or_else(|| EngineError::NotFound("host name".into()))?;
        Ok(HostInfo {
            hostname,
            os: System::long_os_version().unwrap_or_default(),
            kernel: System::kernel_version().unwrap_or_default(),
            uptime_seconds: System::uptime(),
        })
    }
}

/// Parses `/proc/diskstats` into cumulative read and write byte counts.
///
/// Partitions, loop, ram and device-mapper devices are skipped so the totals
/// cover whole disks only. Malformed lines are dropped.
pub fn parse_diskstats(content: &str) -> Vec<DiskCounters> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // major minor name reads merged sectors_read ms writes merged sectors_written
            if fields.len() < 10 {
                return None;
            }
            let name = fields[2];
            if !is_whole_disk(name) {
                return None;
            }
            let sectors_read: u64 = fields[5].parse().ok()?;
            let sectors_written: u64 = fields[9].parse().ok()?;
            Some(DiskCounters {
                name: name.to_string(),
                read_bytes: sectors_read.saturating_mul(SECTOR_BYTES),
                write_bytes: sectors_written.saturating_mul(SECTOR_BYTES),
            })
        })
        .collect()
}

fn is_whole_disk(name: &str) -> bool {
    if ["loop", "ram", "dm-", "zram", "sr"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        return false;
    }
    // nvme0n1 and mmcblk0 are disks; nvme0n1p1 and mmcblk0p1 are partitions
    if let Some(rest) = name.strip_prefix("nvme").or_else(|| name.strip_prefix("mmcblk")) {
        return !rest.contains('p');
    }
    // sda, vdb, xvdc are disks; sda1 is a partition
    !name.ends_with(|c: char| c.is_ascii_digit())
}
