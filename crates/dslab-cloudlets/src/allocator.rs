//! Time-shared allocation of host resources between virtual machines.
//!
//! The same allocator is used for CPU and disk resources, the resource kind is a type parameter which only affects
//! the reported allocation verdicts and log messages.

use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::common::{AllocationVerdict, CAPACITY_EPS};
use crate::id::VmId;

/// Kind of host resource.
pub trait ResourceKind {
    /// Human-readable resource name.
    const NAME: &'static str;
    /// Verdict reported when the resource capacity is insufficient.
    const NOT_ENOUGH_CAPACITY: AllocationVerdict;
    /// Verdict reported when a VM requests more elements than the resource has.
    const NOT_ENOUGH_ELEMENTS: AllocationVerdict;
}

/// CPU resource, measured in MIPS.
pub struct Cpu;

impl ResourceKind for Cpu {
    const NAME: &'static str = "cpu";
    const NOT_ENOUGH_CAPACITY: AllocationVerdict = AllocationVerdict::NotEnoughCpu;
    const NOT_ENOUGH_ELEMENTS: AllocationVerdict = AllocationVerdict::NotEnoughPes;
}

/// Disk resource, measured in IOPS.
pub struct Disk;

impl ResourceKind for Disk {
    const NAME: &'static str = "disk";
    const NOT_ENOUGH_CAPACITY: AllocationVerdict = AllocationVerdict::NotEnoughIops;
    const NOT_ENOUGH_ELEMENTS: AllocationVerdict = AllocationVerdict::NotEnoughIops;
}

/// Allocator of a single resource kind between VMs.
pub trait ResourceAllocator<K: ResourceKind> {
    /// Allocates the requested per-element throughput to the VM, replacing its previous allocation if any.
    fn allocate(&mut self, vm_id: VmId, requested: &[f64]) -> AllocationVerdict;

    /// Releases all resources allocated to the VM. Returns `false` if the VM had no allocation.
    fn release(&mut self, vm_id: VmId) -> bool;

    /// Returns the current per-element share of the VM (empty if the VM has no allocation).
    ///
    /// This is a pure query, it does not change the allocator state.
    fn shares(&self, vm_id: VmId) -> Vec<f64>;

    /// Returns the total resource capacity.
    fn capacity(&self) -> f64;

    /// Returns the capacity which is not requested by any VM.
    fn available(&self) -> f64;

    /// Returns the number of VMs holding an allocation.
    fn consumers(&self) -> usize;
}

/// Time-shared allocator over a pool of resource elements.
///
/// Without oversubscription a request is refused if it does not fit into the available capacity. With
/// oversubscription every request is accepted, and when the total requested throughput exceeds the capacity, each
/// VM share is scaled down proportionally, so that cumulative share never exceeds the capacity.
pub struct TimeSharedAllocator<K: ResourceKind> {
    element_capacities: Vec<f64>,
    capacity: f64,
    oversubscription: bool,
    requests: IndexMap<VmId, Vec<f64>>,
    requested_total: f64,
    kind: PhantomData<K>,
}

impl<K: ResourceKind> TimeSharedAllocator<K> {
    /// Creates allocator over elements with given capacities.
    pub fn new(element_capacities: Vec<f64>, oversubscription: bool) -> Self {
        let capacity = element_capacities.iter().sum();
        Self {
            element_capacities,
            capacity,
            oversubscription,
            requests: IndexMap::new(),
            requested_total: 0.,
            kind: PhantomData,
        }
    }

    /// Returns the number of resource elements.
    pub fn element_count(&self) -> usize {
        self.element_capacities.len()
    }

    /// Returns the total throughput requested by all VMs.
    pub fn requested_total(&self) -> f64 {
        self.requested_total
    }

    fn max_element_capacity(&self) -> f64 {
        self.element_capacities.iter().copied().fold(0., f64::max)
    }

    fn scale(&self) -> f64 {
        if self.requested_total > self.capacity {
            self.capacity / self.requested_total
        } else {
            1.
        }
    }
}

impl<K: ResourceKind> ResourceAllocator<K> for TimeSharedAllocator<K> {
    fn allocate(&mut self, vm_id: VmId, requested: &[f64]) -> AllocationVerdict {
        if requested.len() > self.element_capacities.len() {
            return K::NOT_ENOUGH_ELEMENTS;
        }
        let max_element = self.max_element_capacity();
        if requested.iter().any(|r| *r > max_element + CAPACITY_EPS) {
            return K::NOT_ENOUGH_CAPACITY;
        }
        let previous: f64 = self.requests.get(&vm_id).map(|r| r.iter().sum()).unwrap_or(0.);
        let total: f64 = requested.iter().sum();
        let available = self.capacity - (self.requested_total - previous);
        if !self.oversubscription && total > available + CAPACITY_EPS {
            return K::NOT_ENOUGH_CAPACITY;
        }
        self.requested_total += total - previous;
        self.requests.insert(vm_id, requested.to_vec());
        AllocationVerdict::Success
    }

    fn release(&mut self, vm_id: VmId) -> bool {
        match self.requests.shift_remove(&vm_id) {
            Some(requested) => {
                self.requested_total -= requested.iter().sum::<f64>();
                if self.requests.is_empty() {
                    self.requested_total = 0.;
                }
                true
            }
            None => false,
        }
    }

    fn shares(&self, vm_id: VmId) -> Vec<f64> {
        let scale = self.scale();
        self.requests
            .get(&vm_id)
            .map(|requested| requested.iter().map(|r| r * scale).collect())
            .unwrap_or_default()
    }

    fn capacity(&self) -> f64 {
        self.capacity
    }

    fn available(&self) -> f64 {
        (self.capacity - self.requested_total).max(0.)
    }

    fn consumers(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{Cpu, Disk, ResourceAllocator, TimeSharedAllocator};
    use crate::common::AllocationVerdict;

    #[test]
    fn allocation_without_oversubscription() {
        let mut alloc = TimeSharedAllocator::<Cpu>::new(vec![1000., 1000.], false);
        assert_eq!(alloc.allocate(0, &[1000.]), AllocationVerdict::Success);
        assert_eq!(alloc.allocate(1, &[500., 500.]), AllocationVerdict::Success);
        assert_abs_diff_eq!(alloc.available(), 0.);
        assert_eq!(alloc.allocate(2, &[100.]), AllocationVerdict::NotEnoughCpu);
        assert_eq!(alloc.shares(1), vec![500., 500.]);
        assert!(alloc.shares(2).is_empty());

        assert!(alloc.release(0));
        assert!(!alloc.release(0));
        assert_abs_diff_eq!(alloc.available(), 1000.);
        assert_eq!(alloc.allocate(2, &[100.]), AllocationVerdict::Success);
        assert_eq!(alloc.consumers(), 2);
    }

    #[test]
    fn too_many_or_too_large_elements() {
        let mut alloc = TimeSharedAllocator::<Cpu>::new(vec![1000.], true);
        assert_eq!(alloc.allocate(0, &[500., 500.]), AllocationVerdict::NotEnoughPes);
        assert_eq!(alloc.allocate(0, &[1500.]), AllocationVerdict::NotEnoughCpu);
        let mut disk = TimeSharedAllocator::<Disk>::new(vec![100.], true);
        assert_eq!(disk.allocate(0, &[150.]), AllocationVerdict::NotEnoughIops);
    }

    #[test]
    fn oversubscription_scales_shares() {
        let mut alloc = TimeSharedAllocator::<Disk>::new(vec![100.], true);
        assert_eq!(alloc.allocate(0, &[100.]), AllocationVerdict::Success);
        assert_eq!(alloc.allocate(1, &[100.]), AllocationVerdict::Success);
        assert_eq!(alloc.allocate(2, &[50.]), AllocationVerdict::Success);
        let total: f64 = (0..3).map(|vm| alloc.shares(vm).iter().sum::<f64>()).sum();
        assert_abs_diff_eq!(total, 100., epsilon = 1e-9);
        assert_abs_diff_eq!(alloc.shares(0)[0], 40., epsilon = 1e-9);
        assert_abs_diff_eq!(alloc.shares(2)[0], 20., epsilon = 1e-9);

        alloc.release(1);
        assert_abs_diff_eq!(alloc.shares(0)[0], 100. * 100. / 150., epsilon = 1e-9);
        alloc.release(2);
        assert_abs_diff_eq!(alloc.shares(0)[0], 100., epsilon = 1e-9);
    }

    #[test]
    fn reallocation_replaces_previous_request() {
        let mut alloc = TimeSharedAllocator::<Cpu>::new(vec![1000.], false);
        assert_eq!(alloc.allocate(0, &[800.]), AllocationVerdict::Success);
        assert_eq!(alloc.allocate(0, &[1000.]), AllocationVerdict::Success);
        assert_abs_diff_eq!(alloc.requested_total(), 1000.);
        assert_eq!(alloc.consumers(), 1);
    }
}
