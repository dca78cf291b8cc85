//! Processing elements of hosts: CPU cores and disks.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::data::DataItem;
use crate::id::{DataItemId, DiskId, PeId};

/// CPU processing element (core) with fixed throughput in MIPS.
#[derive(Clone, Debug, Serialize)]
pub struct CpuElement {
    pub id: PeId,
    pub mips: f64,
}

impl CpuElement {
    pub fn new(id: PeId, mips: f64) -> Self {
        Self { id, mips }
    }
}

/// Disk processing element with fixed throughput in IOPS and a set of resident data items.
#[derive(Clone, Debug)]
pub struct DiskElement {
    id: DiskId,
    iops: f64,
    resident_items: FxHashSet<DataItemId>,
}

impl DiskElement {
    /// Creates empty disk with given throughput.
    pub fn new(id: DiskId, iops: f64) -> Self {
        Self {
            id,
            iops,
            resident_items: FxHashSet::default(),
        }
    }

    pub fn id(&self) -> DiskId {
        self.id
    }

    /// Returns disk throughput in IOPS.
    pub fn iops(&self) -> f64 {
        self.iops
    }

    /// Registers the data item on this disk. Returns `false` if the item is not supposed to reside here.
    pub fn store(&mut self, item: &DataItem) -> bool {
        if !item.is_on(self.id) {
            return false;
        }
        self.resident_items.insert(item.id());
        true
    }

    /// Checks whether the data item is stored on this disk.
    pub fn holds(&self, item_id: DataItemId) -> bool {
        self.resident_items.contains(&item_id)
    }

    /// Returns the number of resident data items.
    pub fn item_count(&self) -> usize {
        self.resident_items.len()
    }
}
