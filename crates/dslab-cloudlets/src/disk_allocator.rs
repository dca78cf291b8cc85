//! Allocation of host disks to virtual machines.

use sugars::boxed;

use crate::allocator::{Disk, ResourceAllocator, TimeSharedAllocator};
use crate::common::AllocationVerdict;
use crate::element::DiskElement;
use crate::id::{DiskId, VmId};
use crate::vm::VirtualMachine;

/// Maps VMs to host disks according to their disk affinity.
///
/// Each disk is shared independently by its own time-shared allocator, a VM gets a share only on disks it uses.
pub struct DiskAllocator {
    disks: Vec<(DiskId, Box<dyn ResourceAllocator<Disk>>)>,
}

impl DiskAllocator {
    /// Creates allocator with one sub-allocator per disk.
    pub fn new(disks: &[DiskElement], oversubscription: bool) -> Self {
        Self {
            disks: disks
                .iter()
                .map(|disk| {
                    let allocator: Box<dyn ResourceAllocator<Disk>> =
                        boxed!(TimeSharedAllocator::<Disk>::new(vec![disk.iops()], oversubscription));
                    (disk.id(), allocator)
                })
                .collect(),
        }
    }

    /// Requests the VM I/O throughput on every disk it uses.
    ///
    /// Either all requests succeed or none of them is kept.
    pub fn allocate_vm(&mut self, vm: &VirtualMachine) -> AllocationVerdict {
        for i in 0..self.disks.len() {
            let (disk_id, allocator) = &mut self.disks[i];
            if !vm.uses(*disk_id) {
                continue;
            }
            let verdict = allocator.allocate(vm.id, &[vm.io_mips]);
            if !verdict.is_success() {
                for (_, allocator) in self.disks.iter_mut().take(i) {
                    allocator.release(vm.id);
                }
                return verdict;
            }
        }
        AllocationVerdict::Success
    }

    /// Releases VM shares on all disks.
    pub fn release_vm(&mut self, vm_id: VmId) {
        for (_, allocator) in self.disks.iter_mut() {
            allocator.release(vm_id);
        }
    }

    /// Returns the current VM share of every host disk, zero for disks outside of the VM affinity.
    pub fn allocate_shares(&self, vm: &VirtualMachine) -> Vec<(DiskId, f64)> {
        self.disks
            .iter()
            .map(|(disk_id, allocator)| {
                let share = if vm.uses(*disk_id) {
                    allocator.shares(vm.id).first().copied().unwrap_or(0.)
                } else {
                    0.
                };
                (*disk_id, share)
            })
            .collect()
    }

    /// Returns the IOPS not requested by any VM on the given disk.
    pub fn available(&self, disk_id: DiskId) -> Option<f64> {
        self.disks
            .iter()
            .find(|(id, _)| *id == disk_id)
            .map(|(_, allocator)| allocator.available())
    }

    pub fn disk_ids(&self) -> Vec<DiskId> {
        self.disks.iter().map(|(id, _)| *id).collect()
    }
}
