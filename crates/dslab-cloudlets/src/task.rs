//! Tasks (cloudlets) and their execution state inside a task scheduler.

use std::fmt::{Display, Formatter};
use std::rc::Rc;

use serde::Serialize;

use crate::data::DataItem;
use crate::id::{DiskId, TaskId, VmId};
use crate::work::Work;

/// Unit of work with CPU demand and optional I/O demand on a data item.
///
/// Task is immutable after construction.
#[derive(Clone, Debug)]
pub struct Task {
    id: TaskId,
    cpu_length: u64,
    io_length_per_pe: u64,
    num_io_pes: u32,
    ram: u64,
    data_item: Option<Rc<DataItem>>,
}

impl Task {
    /// Creates CPU-only task with given length (in MI) and memory requirement.
    pub fn new(id: TaskId, cpu_length: u64, ram: u64) -> Self {
        Self {
            id,
            cpu_length,
            io_length_per_pe: 0,
            num_io_pes: 0,
            ram,
            data_item: None,
        }
    }

    /// Adds I/O demand: `num_io_pes` streams of `io_length_per_pe` operations each.
    pub fn with_io(mut self, io_length_per_pe: u64, num_io_pes: u32) -> Self {
        self.io_length_per_pe = io_length_per_pe;
        self.num_io_pes = num_io_pes;
        self
    }

    /// Binds the task I/O to the given data item.
    pub fn with_data_item(mut self, data_item: Rc<DataItem>) -> Self {
        self.data_item = Some(data_item);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cpu_length(&self) -> u64 {
        self.cpu_length
    }

    pub fn io_length_per_pe(&self) -> u64 {
        self.io_length_per_pe
    }

    pub fn num_io_pes(&self) -> u32 {
        self.num_io_pes
    }

    /// Returns the I/O demand over all streams, saturating at `u64::MAX`.
    pub fn total_io_length(&self) -> u64 {
        self.io_length_per_pe.saturating_mul(self.num_io_pes as u64)
    }

    pub fn ram(&self) -> u64 {
        self.ram
    }

    pub fn data_item(&self) -> Option<&Rc<DataItem>> {
        self.data_item.as_ref()
    }
}

/// Lifecycle status of a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    InExec,
    Paused,
    Success,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// Success, failure and cancellation are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TaskStatus::InExec => write!(f, "in_exec"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Reason of task failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TaskFailReason {
    /// Task data is not stored on any disk reachable from the VM.
    DataUnreachable,
    /// VM ran out of memory.
    OutOfMemory,
    /// VM lost access to host resources, e.g. after migration.
    HostAccessLost,
    /// Task was aborted by an external component.
    Aborted,
}

impl Display for TaskFailReason {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TaskFailReason::DataUnreachable => write!(f, "data unreachable"),
            TaskFailReason::OutOfMemory => write!(f, "out of memory"),
            TaskFailReason::HostAccessLost => write!(f, "host access lost"),
            TaskFailReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Task along with its progress and status tracked by a task scheduler.
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    task: Task,
    vm_id: VmId,
    cpu: Work,
    io: Work,
    status: TaskStatus,
    fail_reason: Option<TaskFailReason>,
    pe_index: usize,
    disk_id: Option<DiskId>,
    submission_time: f64,
    exec_start_time: f64,
    finish_time: Option<f64>,
}

impl ScheduledTask {
    pub(crate) fn new(task: Task, vm_id: VmId, time: f64) -> Self {
        let cpu = Work::new(task.cpu_length());
        let io = Work::new(task.total_io_length());
        Self {
            task,
            vm_id,
            cpu,
            io,
            status: TaskStatus::InExec,
            fail_reason: None,
            pe_index: 0,
            disk_id: None,
            submission_time: time,
            exec_start_time: time,
            finish_time: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn vm_id(&self) -> VmId {
        self.vm_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn fail_reason(&self) -> Option<TaskFailReason> {
        self.fail_reason
    }

    /// Index of the VM processing element assigned to the task.
    pub fn pe_index(&self) -> usize {
        self.pe_index
    }

    /// Disk serving the task I/O, `None` if the task has no I/O or its data is unreachable.
    pub fn disk_id(&self) -> Option<DiskId> {
        self.disk_id
    }

    /// CPU length including the virtual overhead of input file transfer.
    pub fn cpu_length(&self) -> u64 {
        self.cpu.length()
    }

    pub fn cpu_done(&self) -> u64 {
        self.cpu.done()
    }

    pub fn io_done(&self) -> u64 {
        self.io.done()
    }

    pub fn remaining_cpu(&self) -> u64 {
        self.cpu.remaining()
    }

    pub fn remaining_io(&self) -> u64 {
        self.io.remaining()
    }

    /// The only finish predicate: both CPU and I/O work is complete.
    pub fn is_done(&self) -> bool {
        self.cpu.is_complete() && self.io.is_complete()
    }

    /// Task has I/O work left but no disk to perform it on.
    pub fn is_stalled(&self) -> bool {
        self.remaining_io() > 0 && self.disk_id.is_none()
    }

    pub fn submission_time(&self) -> f64 {
        self.submission_time
    }

    pub fn exec_start_time(&self) -> f64 {
        self.exec_start_time
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Returns the execution time of successfully completed task and `None` otherwise.
    pub fn exec_time(&self) -> Option<f64> {
        match (self.status, self.finish_time) {
            (TaskStatus::Success, Some(finish_time)) => Some(finish_time - self.exec_start_time),
            _ => None,
        }
    }

    pub(crate) fn assign(&mut self, pe_index: usize, disk_id: Option<DiskId>) {
        self.pe_index = pe_index;
        self.disk_id = disk_id;
    }

    pub(crate) fn set_disk(&mut self, disk_id: Option<DiskId>) {
        self.disk_id = disk_id;
    }

    pub(crate) fn extend_cpu(&mut self, amount: f64) {
        self.cpu.extend_by(amount);
    }

    pub(crate) fn progress(&mut self, cpu: f64, io: f64) {
        self.cpu.advance_by(cpu);
        self.io.advance_by(io);
    }

    /// Marks the task as succeeded if it is done. Returns whether the transition happened.
    pub(crate) fn finalize(&mut self, time: f64) -> bool {
        if !self.is_done() {
            return false;
        }
        self.status = TaskStatus::Success;
        self.finish_time = Some(time);
        true
    }

    pub(crate) fn fail(&mut self, reason: TaskFailReason, time: f64) {
        self.status = TaskStatus::Failed;
        self.fail_reason = Some(reason);
        self.finish_time = Some(time);
    }

    pub(crate) fn cancel(&mut self, time: f64) {
        self.status = TaskStatus::Canceled;
        self.finish_time = Some(time);
    }

    pub(crate) fn pause(&mut self) {
        self.status = TaskStatus::Paused;
    }

    pub(crate) fn resume(&mut self) {
        self.status = TaskStatus::InExec;
    }
}
