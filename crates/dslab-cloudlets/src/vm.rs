//! Representation of virtual machine.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use dslab_core::cast;
use dslab_core::component::Id;
use dslab_core::context::SimulationContext;
use dslab_core::event::{Event, EventId};
use dslab_core::handler::EventHandler;
use dslab_core::{log_debug, log_warn};

use crate::events::{SchedulerWakeup, TaskArrived};
use crate::host::Host;
use crate::id::{DiskId, HostId, TaskId, VmId};
use crate::scheduler::TaskScheduler;
use crate::stats::TaskResult;
use crate::task::{ScheduledTask, Task, TaskFailReason, TaskStatus};

/// Represents virtual machine (VM).
///
// VM is characterized by its CPU capacity (number of PEs and MIPS per PE), I/O capacity, memory and disk affinity.
// Empty affinity means that VM may use every disk of the host it is currently placed on, so it is resolved against
// the host on each query rather than stored.
//
// VM is a simulation component: tasks reach it as `TaskArrived` events and its scheduler is advanced on
// `SchedulerWakeup` self-events emitted for the predicted next task progress event.
pub struct VirtualMachine {
    pub id: VmId,
    pub mips: f64,
    pub pes: u32,
    pub io_mips: f64,
    pub ram: u64,
    affinity: BTreeSet<DiskId>,
    host: Option<Rc<RefCell<Host>>>,
    scheduler: Box<dyn TaskScheduler>,
    pending_tasks: FxHashMap<TaskId, (Task, f64)>,
    wakeup_event: Option<EventId>,
    results: Vec<TaskResult>,
    ctx: SimulationContext,
}

impl VirtualMachine {
    /// Creates virtual machine with specified parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: VmId,
        mips: f64,
        pes: u32,
        io_mips: f64,
        ram: u64,
        affinity: impl IntoIterator<Item = DiskId>,
        scheduler: Box<dyn TaskScheduler>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            id,
            mips,
            pes,
            io_mips,
            ram,
            affinity: affinity.into_iter().collect(),
            host: None,
            scheduler,
            pending_tasks: FxHashMap::default(),
            wakeup_event: None,
            results: Vec::new(),
            ctx,
        }
    }

    /// Returns ID of the simulation component representing this VM.
    pub fn component_id(&self) -> Id {
        self.ctx.id()
    }

    /// Returns explicitly configured disk affinity (empty means all disks of the host).
    pub fn affinity(&self) -> &BTreeSet<DiskId> {
        &self.affinity
    }

    /// Checks whether VM may use the given disk.
    pub fn uses(&self, disk_id: DiskId) -> bool {
        self.affinity.is_empty() || self.affinity.contains(&disk_id)
    }

    /// Returns disks of the given host which VM may use.
    pub fn effective_affinity(&self, host: &Host) -> Vec<DiskId> {
        host.disk_ids().into_iter().filter(|disk| self.uses(*disk)).collect()
    }

    /// Checks that explicit affinity only refers to disks of the given host.
    pub fn affinity_fits(&self, host: &Host) -> bool {
        self.affinity.iter().all(|disk| host.disk(*disk).is_some())
    }

    /// Returns per-PE CPU throughput requested by VM.
    pub fn cpu_request(&self) -> Vec<f64> {
        vec![self.mips; self.pes as usize]
    }

    /// Returns ID of the host VM is placed on.
    pub fn host_id(&self) -> Option<HostId> {
        self.host.as_ref().map(|host| host.borrow().id())
    }

    pub fn scheduler(&self) -> &dyn TaskScheduler {
        self.scheduler.as_ref()
    }

    /// Returns results of tasks which left the scheduler so far, in the order of leaving.
    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    /// Binds VM to the host it was allocated on and resolves the disks it may read data from.
    pub(crate) fn place(&mut self, host: Rc<RefCell<Host>>) {
        self.host = Some(host);
        self.refresh_disks();
    }

    /// Moves VM to another host. If some task data is not reachable from the new host, all VM tasks fail.
    ///
    /// VM must be synced with its previous host before the call.
    pub(crate) fn migrate_to(&mut self, host: Rc<RefCell<Host>>) {
        self.place(host);
        let stalled = self.scheduler.stalled_count();
        if stalled > 0 {
            log_warn!(
                self.ctx,
                "vm #{} lost access to data of {} tasks on host {:?}",
                self.id,
                stalled,
                self.host_id()
            );
            self.scheduler.fail_all(TaskFailReason::HostAccessLost);
        }
        self.sync();
    }

    /// Rebinds task I/O after new data items were placed on the host disks.
    pub(crate) fn on_data_placed(&mut self) {
        self.sync();
        self.refresh_disks();
        self.sync();
    }

    /// Keeps the task until its `TaskArrived` event.
    pub(crate) fn enqueue(&mut self, task: Task, file_transfer_time: f64) {
        self.pending_tasks.insert(task.id(), (task, file_transfer_time));
    }

    pub(crate) fn cancel_task(&mut self, task_id: TaskId) -> Option<TaskStatus> {
        self.sync();
        let status = self.scheduler.cancel(task_id).map(|task| {
            self.record(&task);
            task.status()
        });
        self.sync();
        status
    }

    pub(crate) fn pause_task(&mut self, task_id: TaskId) -> bool {
        self.sync();
        let paused = self.scheduler.pause(task_id);
        self.sync();
        paused
    }

    pub(crate) fn resume_task(&mut self, task_id: TaskId) -> Option<f64> {
        self.sync();
        let estimate = self.scheduler.resume(task_id);
        self.sync();
        estimate
    }

    pub(crate) fn fail_tasks(&mut self, reason: TaskFailReason) -> usize {
        self.sync();
        let count = self.scheduler.fail_all(reason);
        self.sync();
        count
    }

    /// Advances the scheduler to the current time with the shares resolved by the host, collects terminated tasks
    /// and reschedules the wake-up event.
    pub(crate) fn sync(&mut self) {
        let (cpu_shares, io_shares) = match &self.host {
            Some(host) => {
                let host = host.borrow();
                (host.cpu_shares(self.id), host.disk_shares(self))
            }
            None => (Vec::new(), Vec::new()),
        };
        let next = self.scheduler.advance(self.ctx.time(), &cpu_shares, &io_shares);

        while let Some(task) = self.scheduler.get_next_finished() {
            self.record(&task);
        }
        for task in self.scheduler.take_failed() {
            self.record(&task);
        }
        self.schedule_wakeup(next);
    }

    fn refresh_disks(&mut self) {
        let disks = match &self.host {
            Some(host) => host.borrow().reachable_disks(self),
            None => Vec::new(),
        };
        self.scheduler.set_reachable_disks(disks);
    }

    fn schedule_wakeup(&mut self, next: f64) {
        if let Some(event_id) = self.wakeup_event.take() {
            self.ctx.cancel_event(event_id);
        }
        if next.is_finite() {
            let delay = (next - self.ctx.time()).max(0.);
            self.wakeup_event = Some(self.ctx.emit_self(SchedulerWakeup {}, delay));
        }
    }

    fn on_task_arrived(&mut self, task_id: TaskId) {
        let (task, file_transfer_time) = match self.pending_tasks.remove(&task_id) {
            Some(pending) => pending,
            None => {
                log_warn!(self.ctx, "unknown task #{} arrived to vm #{}", task_id, self.id);
                return;
            }
        };
        self.sync();
        self.scheduler.submit(task, file_transfer_time);
        let ram_in_use = self.scheduler.ram_in_use();
        if ram_in_use > self.ram {
            log_warn!(
                self.ctx,
                "vm #{} is out of memory: tasks need {} of {}",
                self.id,
                ram_in_use,
                self.ram
            );
            self.scheduler.fail_all(TaskFailReason::OutOfMemory);
        }
        self.sync();
    }

    fn record(&mut self, task: &ScheduledTask) {
        log_debug!(
            self.ctx,
            "task #{} of vm #{} left scheduler with status {}",
            task.id(),
            task.vm_id(),
            task.status()
        );
        self.results.push(TaskResult::from(task));
    }
}

impl EventHandler for VirtualMachine {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TaskArrived { task_id } => {
                self.on_task_arrived(task_id);
            }
            SchedulerWakeup {} => {
                self.wakeup_event = None;
                self.sync();
            }
        })
    }
}
