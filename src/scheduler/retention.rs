//! Retention rules and policy snapshot naming.
//!
//! A retention rule is one of:
//!
//! - `forever`: never prune.
//! - `<n>h`, `<n>d`, `<n>w`: keep snapshots younger than or exactly as old
//!   as the window. Only strictly older snapshots are pruned.
//! - `keep <n>` or `last <n>`: keep the `n` newest snapshots.
//!
//! Only snapshots whose name is `<policy>-<YYYYMMDD-HHMMSS>` are ever
//! considered, and their age comes from the timestamp in the name.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Forever,
    MaxAge(Duration),
    KeepLast(usize),
}

impl Retention {
    pub fn parse(spec: &str) -> Result<Self> {
        let normalized = spec.trim().to_ascii_lowercase();
        if normalized == "forever" {
            return Ok(Retention::Forever);
        }

        let count = normalized
            .strip_prefix("keep")
            .or_else(|| normalized.strip_prefix("last"));
        if let Some(count) = count {
            let count: usize = count
                .trim()
                .parse()
                .map_err(|_| invalid(spec, "expected a snapshot count"))?;
            if count == 0 {
                return Err(invalid(spec, "count must be positive"));
            }
            return Ok(Retention::KeepLast(count));
        }

        let unit_at = normalized
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid(spec, "missing unit"))?;
        let (digits, unit) = normalized.split_at(unit_at);
        let amount: i64 = digits
            .parse()
            .map_err(|_| invalid(spec, "missing amount"))?;
        if amount == 0 {
            return Err(invalid(spec, "window must be positive"));
        }
        let window = match unit {
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            _ => return Err(invalid(spec, "unit must be one of h, d, w")),
        };
        window
            .map(Retention::MaxAge)
            .ok_or_else(|| invalid(spec, "window too large"))
    }

    /// Picks the items to prune from `(created_at, item)` pairs, oldest first.
    pub fn select_expired<T>(
        &self,
        mut snapshots: Vec<(DateTime<Utc>, T)>,
        now: DateTime<Utc>,
    ) -> Vec<T> {
        snapshots.sort_by_key(|(created_at, _)| *created_at);
        match *self {
            Retention::Forever => Vec::new(),
            Retention::MaxAge(window) => snapshots
                .into_iter()
                .filter(|(created_at, _)| now - *created_at > window)
                .map(|(_, item)| item)
                .collect(),
            Retention::KeepLast(keep) => {
                let excess = snapshots.len().saturating_sub(keep);
                snapshots
                    .into_iter()
                    .take(excess)
                    .map(|(_, item)| item)
                    .collect()
            }
        }
    }
}

impl FromStr for Retention {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Retention::parse(s)
    }
}

fn invalid(spec: &str, reason: &str) -> EngineError {
    EngineError::Validation(format!("invalid retention {spec:?}: {reason}"))
}

/// `<policy>-<YYYYMMDD-HHMMSS>` in UTC.
pub fn snapshot_name(policy: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", policy, at.format(TIMESTAMP_FORMAT))
}

/// Recovers the timestamp from a name produced by [`snapshot_name`] for
/// `policy`. Any other name yields `None`.
pub fn parse_snapshot_name(policy: &str, name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.strip_prefix(policy)?.strip_prefix('-')?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}
