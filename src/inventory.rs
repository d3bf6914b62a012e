//! Latest known pools, datasets and disks.
//!
//! Scanners replace each collection wholesale, so readers always observe a
//! complete result of one scan and never a mix of two.

use crate::disk::DiskInfo;
use crate::zfs::{Dataset, Pool};
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct Inventory {
    pools: RwLock<Arc<Vec<Pool>>>,
    datasets: RwLock<Arc<Vec<Dataset>>>,
    disks: RwLock<Arc<Vec<DiskInfo>>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pools(&self) -> Arc<Vec<Pool>> {
        read(&self.pools)
    }

    pub fn datasets(&self) -> Arc<Vec<Dataset>> {
        read(&self.datasets)
    }

    pub fn disks(&self) -> Arc<Vec<DiskInfo>> {
        read(&self.disks)
    }

    pub fn replace_pools(&self, pools: Vec<Pool>) {
        write(&self.pools, pools);
    }

    pub fn replace_datasets(&self, datasets: Vec<Dataset>) {
        write(&self.datasets, datasets);
    }

    pub fn replace_disks(&self, disks: Vec<DiskInfo>) {
        write(&self.disks, disks);
    }
}

fn read<T>(lock: &RwLock<Arc<Vec<T>>>) -> Arc<Vec<T>> {
    lock.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn write<T>(lock: &RwLock<Arc<Vec<T>>>, value: Vec<T>) {
    *lock
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(value);
}
