//! Task schedulers of virtual machines.

mod dual_resource;

#[cfg(test)]
mod tests;

pub use dual_resource::DualResourceScheduler;

use crate::element::DiskElement;
use crate::id::{DiskId, TaskId};
use crate::task::{ScheduledTask, Task, TaskFailReason};

/// Capability interface of a VM task scheduler.
///
/// Scheduler is driven by an external clock: it never advances by itself and only reacts to the calls below, which
/// are expected to be made sequentially with non-decreasing time values.
pub trait TaskScheduler {
    /// Returns scheduler name used in logs.
    fn name(&self) -> &str;

    /// Returns the time of the last update.
    fn time(&self) -> f64;

    /// Submits task for execution at the time of the last update.
    ///
    /// CPU length of the task is extended by the work the task could have done during `file_transfer_time`.
    /// Returns the predicted time of the nearest task progress event, or `None` if the task failed immediately.
    fn submit(&mut self, task: Task, file_transfer_time: f64) -> Option<f64>;

    /// Advances all running tasks to `now` using the given shares of CPU elements and disks, finalizes completed
    /// tasks and returns the time of the next expected event (`f64::INFINITY` if no progress is expected).
    fn advance(&mut self, now: f64, cpu_shares: &[f64], io_shares: &[(DiskId, f64)]) -> f64;

    /// Removes the task from the scheduler and returns it.
    fn cancel(&mut self, task_id: TaskId) -> Option<ScheduledTask>;

    /// Pauses running task. Returns `false` if there is no such running task.
    fn pause(&mut self, task_id: TaskId) -> bool;

    /// Resumes paused task and returns its estimated finish time, or `None` if there is no such paused task.
    fn resume(&mut self, task_id: TaskId) -> Option<f64>;

    /// Fails all running and paused tasks. Returns the number of failed tasks.
    fn fail_all(&mut self, reason: TaskFailReason) -> usize;

    /// Returns the number of running tasks.
    fn running_count(&self) -> usize;

    /// Returns the number of paused tasks.
    fn paused_count(&self) -> usize;

    /// Checks whether there are successfully finished tasks which are not yet collected.
    fn is_finished_available(&self) -> bool;

    /// Removes and returns the next successfully finished task.
    fn get_next_finished(&mut self) -> Option<ScheduledTask>;

    /// Removes and returns all failed tasks.
    fn take_failed(&mut self) -> Vec<ScheduledTask>;

    /// Returns running or paused task by ID.
    fn task(&self, task_id: TaskId) -> Option<&ScheduledTask>;

    /// Updates the disks reachable from VM and rebinds the tasks I/O to the disks holding their data.
    ///
    /// Disks are given in increasing ID order, as snapshots of host disks with their resident data items.
    fn set_reachable_disks(&mut self, disks: Vec<DiskElement>);

    /// Returns the number of running or paused tasks which cannot make I/O progress because their data is unreachable.
    fn stalled_count(&self) -> usize;

    /// Returns the memory used by running and paused tasks.
    fn ram_in_use(&self) -> u64;
}
