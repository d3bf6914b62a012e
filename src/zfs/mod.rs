//! ZFS Gateway
//!
//! Thin wrapper over the `zpool`/`zfs` command-line tools. Every call goes
//! through the injected [`Executor`], so the gateway never spawns processes
//! itself and can be driven by a [`FakeExecutor`](crate::exec::FakeExecutor)
//! in tests.
//!
//! # Output Format
//!
//! Listings use `-H -p`: no header, tab-separated columns and exact
//! (unscaled) numbers. See [`parse`] for the column layouts.

use crate::error::{EngineError, Result};
use crate::exec::Executor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod parse;
pub mod types;

pub use types::{Dataset, DatasetType, Pool, PoolHealth, SnapshotRef};

const ZPOOL: &str = "zpool";
const ZFS: &str = "zfs";

#[derive(Clone)]
pub struct ZfsGateway {
    executor: Arc<dyn Executor>,
}

impl ZfsGateway {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub async fn list_pools(&self, cancel: &CancellationToken) -> Result<Vec<Pool>> {
        let stdout = self
            .executor
            .output(
                cancel,
                ZPOOL,
                &["list", "-H", "-p", "-o", "name,size,alloc,free,health"],
            )
            .await?;
        let pools = parse::parse_pool_list(&String::from_utf8_lossy(&stdout));
        debug!("Listed {} pools", pools.len());
        Ok(pools)
    }

    pub async fn list_datasets(&self, cancel: &CancellationToken) -> Result<Vec<Dataset>> {
        let stdout = self
            .executor
            .output(
                cancel,
                ZFS,
                &[
                    "list",
                    "-H",
                    "-p",
                    "-t",
                    "filesystem,volume",
                    "-o",
                    "name,type,used,avail,mountpoint",
                ],
            )
            .await?;
        let datasets = parse::parse_dataset_list(&String::from_utf8_lossy(&stdout));
        debug!("Listed {} datasets", datasets.len());
        Ok(datasets)
    }

    /// Direct snapshots of `dataset`, oldest first.
    pub async fn list_snapshots(
        &self,
        cancel: &CancellationToken,
        dataset: &str,
    ) -> Result<Vec<SnapshotRef>> {
        validate_dataset_name(dataset)?;
        let stdout = self
            .executor
            .output(
                cancel,
                ZFS,
                &[
                    "list",
                    "-H",
                    "-p",
                    "-t",
                    "snapshot",
                    "-d",
                    "1",
                    "-o",
                    "name,creation,used",
                    dataset,
                ],
            )
            .await?;
        let snapshots = parse::parse_snapshot_list(&String::from_utf8_lossy(&stdout))
            .into_iter()
            .filter(|s| s.dataset == dataset)
            .collect();
        Ok(snapshots)
    }

    /// Creates `dataset@name`.
    ///
    /// Returns [`EngineError::AlreadyExists`] when the snapshot is already
    /// present, which callers treat as success.
    pub async fn create_snapshot(
        &self,
        cancel: &CancellationToken,
        dataset: &str,
        name: &str,
    ) -> Result<()> {
        validate_dataset_name(dataset)?;
        validate_snapshot_name(name)?;
        let full_name = format!("{dataset}@{name}");

        match self.executor.run(cancel, ZFS, &["snapshot", &full_name]).await {
            Ok(()) => {
                info!("Created snapshot {}", full_name);
                Ok(())
            }
            Err(EngineError::CommandFailed { stderr, .. })
                if stderr.contains("already exists") =>
            {
                Err(EngineError::AlreadyExists(full_name))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn destroy_snapshot(
        &self,
        cancel: &CancellationToken,
        snapshot: &SnapshotRef,
    ) -> Result<()> {
        // `zfs destroy` on a bare dataset name removes the dataset itself, so
        // both halves must be present before the `@` form is built.
        validate_dataset_name(&snapshot.dataset)?;
        validate_snapshot_name(&snapshot.name)?;
        let full_name = snapshot.full_name();

        match self.executor.run(cancel, ZFS, &["destroy", &full_name]).await {
            Ok(()) => {
                info!("Destroyed snapshot {}", full_name);
                Ok(())
            }
            Err(EngineError::CommandFailed { stderr, .. })
                if stderr.contains("could not find any snapshots")
                    || stderr.contains("does not exist") =>
            {
                Err(EngineError::NotFound(full_name))
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return Err(EngineError::Validation(format!(
            "invalid dataset name {name:?}"
        )));
    }
    if name.contains('@') || name.chars().any(char::is_whitespace) {
        return Err(EngineError::Validation(format!(
            "invalid dataset name {name:?}"
        )));
    }
    Ok(())
}

fn validate_snapshot_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('@') || name.contains('/') {
        return Err(EngineError::Validation(format!(
            "invalid snapshot name {name:?}"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(EngineError::Validation(format!(
            "invalid snapshot name {name:?}"
        )));
    }
    Ok(())
}
