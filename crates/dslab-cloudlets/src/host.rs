//! Physical host with CPU and disk resources.

use std::collections::BTreeSet;

use sugars::boxed;

use crate::allocator::{Cpu, ResourceAllocator, TimeSharedAllocator};
use crate::common::AllocationVerdict;
use crate::config::SimulationConfig;
use crate::data::DataItem;
use crate::disk_allocator::DiskAllocator;
use crate::element::{CpuElement, DiskElement};
use crate::id::{DataItemId, DiskId, HostId, VmId};
use crate::vm::VirtualMachine;

/// Host owning CPU and disk elements along with allocators sharing them between VMs.
pub struct Host {
    id: HostId,
    name: String,
    cpu_elements: Vec<CpuElement>,
    disk_elements: Vec<DiskElement>,
    cpu_allocator: Box<dyn ResourceAllocator<Cpu>>,
    disk_allocator: DiskAllocator,
    vms: BTreeSet<VmId>,
}

impl Host {
    /// Creates host with given elements, allocators are configured according to the simulation config.
    pub fn new(
        id: HostId,
        name: &str,
        cpu_elements: Vec<CpuElement>,
        disk_elements: Vec<DiskElement>,
        config: &SimulationConfig,
    ) -> Self {
        let cpu_allocator = boxed!(TimeSharedAllocator::<Cpu>::new(
            cpu_elements.iter().map(|pe| pe.mips).collect(),
            config.cpu_oversubscription,
        ));
        let disk_allocator = DiskAllocator::new(&disk_elements, config.disk_oversubscription);
        Self {
            id,
            name: name.to_string(),
            cpu_elements,
            disk_elements,
            cpu_allocator,
            disk_allocator,
            vms: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cpu_elements(&self) -> &[CpuElement] {
        &self.cpu_elements
    }

    pub fn disks(&self) -> &[DiskElement] {
        &self.disk_elements
    }

    /// Returns disk by its ID.
    pub fn disk(&self, disk_id: DiskId) -> Option<&DiskElement> {
        self.disk_elements.iter().find(|disk| disk.id() == disk_id)
    }

    pub fn disk_ids(&self) -> Vec<DiskId> {
        self.disk_elements.iter().map(|disk| disk.id()).collect()
    }

    /// Registers the data item on the host disks it resides on. Returns the number of such disks.
    pub fn place_data(&mut self, item: &DataItem) -> usize {
        self.disk_elements
            .iter_mut()
            .map(|disk| disk.store(item))
            .filter(|stored| *stored)
            .count()
    }

    /// Returns IDs of host disks holding the given data item.
    pub fn disks_holding(&self, item_id: DataItemId) -> Vec<DiskId> {
        self.disk_elements
            .iter()
            .filter(|disk| disk.holds(item_id))
            .map(|disk| disk.id())
            .collect()
    }

    /// Allocates CPU and disk shares to the VM.
    ///
    /// Explicit VM affinity must refer only to disks of this host.
    pub fn allocate_vm(&mut self, vm: &VirtualMachine) -> AllocationVerdict {
        if !vm.affinity_fits(self) {
            return AllocationVerdict::AffinityMismatch;
        }
        let verdict = self.cpu_allocator.allocate(vm.id, &vm.cpu_request());
        if !verdict.is_success() {
            return verdict;
        }
        let verdict = self.disk_allocator.allocate_vm(vm);
        if !verdict.is_success() {
            self.cpu_allocator.release(vm.id);
            return verdict;
        }
        self.vms.insert(vm.id);
        AllocationVerdict::Success
    }

    /// Releases all resources allocated to the VM.
    pub fn release_vm(&mut self, vm_id: VmId) -> bool {
        if !self.vms.remove(&vm_id) {
            return false;
        }
        self.cpu_allocator.release(vm_id);
        self.disk_allocator.release_vm(vm_id);
        true
    }

    /// Returns IDs of VMs placed on this host.
    pub fn vms(&self) -> &BTreeSet<VmId> {
        &self.vms
    }

    /// Returns the current per-PE CPU share of the VM.
    pub fn cpu_shares(&self, vm_id: VmId) -> Vec<f64> {
        self.cpu_allocator.shares(vm_id)
    }

    /// Returns the current VM share of every host disk.
    pub fn disk_shares(&self, vm: &VirtualMachine) -> Vec<(DiskId, f64)> {
        self.disk_allocator.allocate_shares(vm)
    }

    /// Returns disks of this host which the VM may use, along with the data items they hold.
    pub fn reachable_disks(&self, vm: &VirtualMachine) -> Vec<DiskElement> {
        self.disk_elements
            .iter()
            .filter(|disk| vm.uses(disk.id()))
            .cloned()
            .collect()
    }

    /// Returns the CPU capacity not requested by any VM.
    pub fn cpu_available(&self) -> f64 {
        self.cpu_allocator.available()
    }

    /// Returns the IOPS of the given disk not requested by any VM.
    pub fn disk_available(&self, disk_id: DiskId) -> Option<f64> {
        self.disk_allocator.available(disk_id)
    }
}
