//! Simulation of hosts, VMs and their tasks on top of dslab-core.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{boxed, rc, refcell};

use dslab_core::cast;
use dslab_core::context::SimulationContext;
use dslab_core::event::Event;
use dslab_core::handler::EventHandler;
use dslab_core::simulation::Simulation;
use dslab_core::{log_debug, log_info, log_warn};

use crate::common::SimulationError;
use crate::config::SimulationConfig;
use crate::data::DataItem;
use crate::element::{CpuElement, DiskElement};
use crate::events::{Checkpoint, TaskArrived};
use crate::host::Host;
use crate::id::{DataItemId, DiskId, HostId, IdAllocator, TaskId, VmId};
use crate::scheduler::DualResourceScheduler;
use crate::stats::{SimulationStats, TaskResult};
use crate::task::{Task, TaskFailReason, TaskStatus};
use crate::vm::VirtualMachine;

/// Receives checkpoints which bound the clock of [`CloudSimulation::step_for_duration`].
struct Checkpoints {}

impl EventHandler for Checkpoints {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Checkpoint {} => {}
        })
    }
}

/// Entry point of the simulation: creates hosts, VMs and data items, submits tasks and drives the simulation clock.
///
/// Every VM is a simulation component. Submitted tasks reach VMs as events after the submission delay, and each VM
/// schedules a wake-up event for the next task progress event predicted by its scheduler.
pub struct CloudSimulation {
    sim: Simulation,
    ctx: SimulationContext,
    config: SimulationConfig,
    host_ids: IdAllocator,
    pe_ids: IdAllocator,
    disk_ids: IdAllocator,
    vm_ids: IdAllocator,
    data_ids: IdAllocator,
    task_ids: IdAllocator,
    hosts: BTreeMap<HostId, Rc<RefCell<Host>>>,
    vms: BTreeMap<VmId, Rc<RefCell<VirtualMachine>>>,
    data_items: BTreeMap<DataItemId, Rc<DataItem>>,
}

impl CloudSimulation {
    pub fn new(mut sim: Simulation, config: SimulationConfig) -> Self {
        let ctx = sim.create_context("simulation");
        sim.add_handler("simulation", rc!(refcell!(Checkpoints {})));
        Self {
            sim,
            ctx,
            config,
            host_ids: IdAllocator::new(),
            pe_ids: IdAllocator::new(),
            disk_ids: IdAllocator::new(),
            vm_ids: IdAllocator::new(),
            data_ids: IdAllocator::new(),
            task_ids: IdAllocator::new(),
            hosts: BTreeMap::new(),
            vms: BTreeMap::new(),
            data_items: BTreeMap::new(),
        }
    }

    /// Adds host with CPU elements of given MIPS and disks of given IOPS.
    pub fn add_host(&mut self, name: &str, pe_mips: &[f64], disk_iops: &[f64]) -> HostId {
        let id = self.host_ids.next_id();
        let cpu_elements = pe_mips
            .iter()
            .map(|mips| CpuElement::new(self.pe_ids.next_id(), *mips))
            .collect();
        let disk_elements = disk_iops
            .iter()
            .map(|iops| DiskElement::new(self.disk_ids.next_id(), *iops))
            .collect();
        let host = Host::new(id, name, cpu_elements, disk_elements, &self.config);
        log_debug!(self.ctx, "host {} added with disks {:?}", name, host.disk_ids());
        self.hosts.insert(id, rc!(refcell!(host)));
        id
    }

    /// Creates data item of given size stored on the listed disks.
    ///
    /// VMs already running on the hosts of these disks may read the item right away.
    pub fn create_data_item(&mut self, size: u64, disks: &[DiskId]) -> Result<Rc<DataItem>, SimulationError> {
        for disk_id in disks {
            if !self.hosts.values().any(|host| host.borrow().disk(*disk_id).is_some()) {
                return Err(SimulationError::DiskNotFound(*disk_id));
            }
        }
        let item = rc!(DataItem::new(self.data_ids.next_id(), size, disks.iter().copied()));
        for host in self.hosts.values() {
            if host.borrow_mut().place_data(&item) == 0 {
                continue;
            }
            let vm_ids: Vec<VmId> = host.borrow().vms().iter().copied().collect();
            for vm_id in vm_ids {
                if let Some(vm) = self.vms.get(&vm_id) {
                    vm.borrow_mut().on_data_placed();
                }
            }
        }
        log_debug!(self.ctx, "data item #{} placed on disks {:?}", item.id(), disks);
        self.data_items.insert(item.id(), item.clone());
        Ok(item)
    }

    /// Creates VM on the given host.
    ///
    /// Empty `affinity` allows VM to use all disks of the host it is placed on.
    pub fn spawn_vm(
        &mut self,
        host_id: HostId,
        mips: f64,
        pes: u32,
        io_mips: f64,
        ram: u64,
        affinity: &[DiskId],
    ) -> Result<VmId, SimulationError> {
        let host = self
            .hosts
            .get(&host_id)
            .cloned()
            .ok_or(SimulationError::HostNotFound(host_id))?;
        // shares of VMs already placed on the host may change
        self.sync_host(host_id);

        let id = self.vm_ids.next_id();
        let name = format!("vm-{}", id);
        let scheduler = boxed!(DualResourceScheduler::new(&name, id, &self.config));
        let mut vm = VirtualMachine::new(
            id,
            mips,
            pes,
            io_mips,
            ram,
            affinity.iter().copied(),
            scheduler,
            self.sim.create_context(&name),
        );
        let verdict = host.borrow_mut().allocate_vm(&vm);
        if !verdict.is_success() {
            log_warn!(
                self.ctx,
                "failed to allocate vm #{} on host {}: {}",
                id,
                host.borrow().name(),
                verdict
            );
            return Err(SimulationError::AllocationFailed(verdict));
        }
        vm.place(host.clone());
        log_debug!(self.ctx, "vm #{} allocated on host {}", id, host.borrow().name());
        let vm = rc!(refcell!(vm));
        self.sim.add_handler(&name, vm.clone());
        self.vms.insert(id, vm);
        self.sync_host(host_id);
        Ok(id)
    }

    /// Returns a fresh task ID.
    pub fn new_task_id(&mut self) -> TaskId {
        self.task_ids.next_id()
    }

    /// Submits task to VM after the given delay. Negative delay is treated as zero.
    pub fn submit_task(
        &mut self,
        vm_id: VmId,
        task: Task,
        delay: f64,
        file_transfer_time: f64,
    ) -> Result<(), SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let task_id = task.id();
        let component_id = {
            let mut vm = vm.borrow_mut();
            vm.enqueue(task, file_transfer_time);
            vm.component_id()
        };
        self.ctx.emit(TaskArrived { task_id }, component_id, delay.max(0.));
        Ok(())
    }

    /// Cancels submitted task and returns its final status, `None` if VM has no such task.
    pub fn cancel_task(&mut self, vm_id: VmId, task_id: TaskId) -> Result<Option<TaskStatus>, SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let status = vm.borrow_mut().cancel_task(task_id);
        Ok(status)
    }

    /// Pauses running task. Returns `false` if VM has no such running task.
    pub fn pause_task(&mut self, vm_id: VmId, task_id: TaskId) -> Result<bool, SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let paused = vm.borrow_mut().pause_task(task_id);
        Ok(paused)
    }

    /// Resumes paused task and returns its estimated next event time.
    pub fn resume_task(&mut self, vm_id: VmId, task_id: TaskId) -> Result<Option<f64>, SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let estimate = vm.borrow_mut().resume_task(task_id);
        Ok(estimate)
    }

    /// Fails all running and paused tasks of the VM.
    pub fn fail_vm_tasks(&mut self, vm_id: VmId, reason: TaskFailReason) -> Result<usize, SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let count = vm.borrow_mut().fail_tasks(reason);
        Ok(count)
    }

    /// Moves VM to another host.
    ///
    /// VM affinity is resolved against the new host. If some task data becomes unreachable, all VM tasks fail.
    pub fn migrate_vm(&mut self, vm_id: VmId, target_host: HostId) -> Result<(), SimulationError> {
        let vm = self.vm_ref(vm_id)?;
        let target = self
            .hosts
            .get(&target_host)
            .cloned()
            .ok_or(SimulationError::HostNotFound(target_host))?;
        let source_host = vm.borrow().host_id();
        if source_host == Some(target_host) {
            return Ok(());
        }
        if let Some(source_host) = source_host {
            self.sync_host(source_host);
        }
        self.sync_host(target_host);

        let verdict = target.borrow_mut().allocate_vm(&vm.borrow());
        if !verdict.is_success() {
            log_warn!(
                self.ctx,
                "failed to migrate vm #{} to host #{}: {}",
                vm_id,
                target_host,
                verdict
            );
            return Err(SimulationError::AllocationFailed(verdict));
        }
        if let Some(source) = source_host.and_then(|id| self.hosts.get(&id)) {
            source.borrow_mut().release_vm(vm_id);
        }
        vm.borrow_mut().migrate_to(target);
        log_info!(
            self.ctx,
            "vm #{} migrated from host {:?} to host #{}",
            vm_id,
            source_host,
            target_host
        );

        if let Some(source_host) = source_host {
            self.sync_host(source_host);
        }
        self.sync_host(target_host);
        Ok(())
    }

    /// Processes the next event. Returns `false` if there are no more events.
    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Performs up to `step_count` steps. Returns `false` if there are no more events.
    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    /// Processes events until there are none left.
    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Processes events for the given duration and advances the clock by it.
    ///
    /// Non-positive or NaN duration does nothing, so the clock never goes back. Infinite duration runs the
    /// simulation until there are no events.
    pub fn step_for_duration(&mut self, duration: f64) {
        if duration.is_nan() || duration <= 0. {
            return;
        }
        if duration.is_infinite() {
            self.step_until_no_events();
            return;
        }
        self.ctx.emit_self(Checkpoint {}, duration);
        self.sim.step_for_duration(duration);
        self.sync_all();
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn host(&self, host_id: HostId) -> Option<Rc<RefCell<Host>>> {
        self.hosts.get(&host_id).cloned()
    }

    pub fn vm(&self, vm_id: VmId) -> Option<Rc<RefCell<VirtualMachine>>> {
        self.vms.get(&vm_id).cloned()
    }

    pub fn data_item(&self, item_id: DataItemId) -> Option<Rc<DataItem>> {
        self.data_items.get(&item_id).cloned()
    }

    /// Returns results of all tasks which left their schedulers so far, grouped by VM.
    pub fn results(&self) -> Vec<TaskResult> {
        self.vms
            .values()
            .flat_map(|vm| vm.borrow().results().to_vec())
            .collect()
    }

    /// Returns result of the given task if it is finished.
    pub fn result(&self, task_id: TaskId) -> Option<TaskResult> {
        self.vms.values().find_map(|vm| {
            vm.borrow()
                .results()
                .iter()
                .find(|result| result.task_id == task_id)
                .cloned()
        })
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats::from_results(&self.results())
    }

    fn vm_ref(&self, vm_id: VmId) -> Result<Rc<RefCell<VirtualMachine>>, SimulationError> {
        self.vms.get(&vm_id).cloned().ok_or(SimulationError::VmNotFound(vm_id))
    }

    fn sync_all(&mut self) {
        for vm in self.vms.values() {
            vm.borrow_mut().sync();
        }
    }

    fn sync_host(&mut self, host_id: HostId) {
        let vm_ids: Vec<VmId> = self
            .hosts
            .get(&host_id)
            .map(|host| host.borrow().vms().iter().copied().collect())
            .unwrap_or_default();
        for vm_id in vm_ids {
            if let Some(vm) = self.vms.get(&vm_id) {
                vm.borrow_mut().sync();
            }
        }
    }
}
