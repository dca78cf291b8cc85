//! Identifiers of simulation entities and their allocation.

/// Identifier of a host.
pub type HostId = u32;
/// Identifier of a virtual machine.
pub type VmId = u32;
/// Identifier of a disk element.
pub type DiskId = u32;
/// Identifier of a CPU processing element.
pub type PeId = u32;
/// Identifier of a data item.
pub type DataItemId = u32;
/// Identifier of a task (cloudlet).
pub type TaskId = u32;

/// Hands out unique identifiers in increasing order.
///
/// The allocator is owned by whoever creates the entities (usually [`CloudSimulation`](crate::CloudSimulation))
/// and is passed around explicitly, so separate simulations never share identifier state.
#[derive(Clone, Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Creates allocator which starts from zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next unused identifier.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns the number of identifiers handed out so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}
