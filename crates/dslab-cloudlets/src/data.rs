//! Data items stored on disks.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::id::{DataItemId, DiskId};

/// Immutable unit of data residing on a fixed set of disks.
///
/// Data items never migrate between disks, the set of resident disks is fixed at creation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataItem {
    id: DataItemId,
    size: u64,
    resident_disks: BTreeSet<DiskId>,
}

impl DataItem {
    /// Creates data item of given size residing on the listed disks.
    pub fn new(id: DataItemId, size: u64, resident_disks: impl IntoIterator<Item = DiskId>) -> Self {
        Self {
            id,
            size,
            resident_disks: resident_disks.into_iter().collect(),
        }
    }

    pub fn id(&self) -> DataItemId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns IDs of disks holding this item in increasing order.
    pub fn resident_disks(&self) -> &BTreeSet<DiskId> {
        &self.resident_disks
    }

    /// Checks whether the item resides on the given disk.
    pub fn is_on(&self, disk_id: DiskId) -> bool {
        self.resident_disks.contains(&disk_id)
    }
}
