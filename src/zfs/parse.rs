//! Parsers for tab-separated `zpool list -H -p` and `zfs list -H -p` output.
//!
//! Each function returns the rows it could parse. A malformed row is logged
//! and skipped so one odd line never hides the rest of the listing.

use super::types::{Dataset, DatasetType, Pool, PoolHealth, SnapshotRef};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Columns: `name size alloc free health`
pub fn parse_pool_list(output: &str) -> Vec<Pool> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_pool_line(line) {
            Ok(pool) => Some(pool),
            Err(reason) => {
                warn!("Skipping malformed zpool line {:?}: {}", line, reason);
                None
            }
        })
        .collect()
}

fn parse_pool_line(line: &str) -> Result<Pool, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    Ok(Pool {
        name: non_empty(fields[0], "name")?,
        size: parse_bytes(fields[1], "size")?,
        allocated: parse_bytes(fields[2], "alloc")?,
        free: parse_bytes(fields[3], "free")?,
        health: PoolHealth::parse(fields[4]),
    })
}

/// Columns: `name type used avail mountpoint`
pub fn parse_dataset_list(output: &str) -> Vec<Dataset> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_dataset_line(line) {
            Ok(dataset) => Some(dataset),
            Err(reason) => {
                warn!("Skipping malformed zfs line {:?}: {}", line, reason);
                None
            }
        })
        .collect()
}

fn parse_dataset_line(line: &str) -> Result<Dataset, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    let kind = DatasetType::parse(fields[1])
        .ok_or_else(|| format!("unknown dataset type {:?}", fields[1]))?;
    let mountpoint = match fields[4] {
        "-" | "none" | "legacy" | "" => None,
        path => Some(path.to_string()),
    };

    Ok(Dataset {
        name: non_empty(fields[0], "name")?,
        kind,
        used: parse_bytes(fields[2], "used")?,
        available: parse_bytes(fields[3], "avail")?,
        mountpoint,
    })
}

/// Columns: `name creation used`, with `name` in `dataset@snapshot` form.
/// Rows are returned oldest first; ties are broken by name.
pub fn parse_snapshot_list(output: &str) -> Vec<SnapshotRef> {
    let mut snapshots: Vec<SnapshotRef> = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_snapshot_line(line) {
            Ok(snapshot) => Some(snapshot),
            Err(reason) => {
                warn!("Skipping malformed snapshot line {:?}: {}", line, reason);
                None
            }
        })
        .collect();

    snapshots.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    snapshots
}

fn parse_snapshot_line(line: &str) -> Result<SnapshotRef, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    }

    let mut snapshot = SnapshotRef::parse_full_name(fields[0])
        .ok_or_else(|| format!("{:?} is not a dataset@snapshot name", fields[0]))?;
    let epoch: i64 = fields[1]
        .trim()
        .parse()
        .map_err(|_| format!("invalid creation time {:?}", fields[1]))?;
    snapshot.created_at = Some(
        DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| format!("creation time {} out of range", epoch))?,
    );
    snapshot.used = parse_bytes(fields[2], "used")?;
    Ok(snapshot)
}

fn parse_bytes(value: &str, column: &str) -> Result<u64, String> {
    let value = value.trim();
    if value == "-" {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| format!("invalid {} value {:?}", column, value))
}

fn non_empty(value: &str, column: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        Err(format!("empty {}", column))
    } else {
        Ok(value.to_string())
    }
}
