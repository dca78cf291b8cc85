//! Time-shared task scheduler with CPU and disk I/O demands.
//!
//! Each running task consumes two resources at once. CPU is shared between tasks which still have CPU work: the
//! total VM CPU share is divided by the number of such tasks, but never by less than the number of VM processing
//! elements, so a single task can not run faster than one element. Disk throughput is shared independently per
//! disk: the VM share of a disk is divided between the running tasks which still have I/O work on that disk.
//! A task finishes only when both its CPU and I/O work is complete.

use std::collections::VecDeque;
use std::mem;

use dslab_core::{log_debug, log_trace, log_warn};
use rustc_hash::FxHashMap;

use crate::config::{SimulationConfig, DEFAULT_MIN_TIME_BETWEEN_EVENTS};
use crate::element::DiskElement;
use crate::id::{DiskId, TaskId, VmId};
use crate::task::{ScheduledTask, Task, TaskFailReason};

use super::TaskScheduler;

/// Returns the disk serving the task I/O: the first reachable disk which holds the task data.
///
/// Tasks without I/O need no disk. Tasks with I/O but without data item may use any reachable disk.
fn resolve_disk(task: &Task, reachable: &[DiskElement]) -> Option<DiskId> {
    if task.total_io_length() == 0 {
        return None;
    }
    let disk = match task.data_item() {
        Some(item) => reachable.iter().find(|disk| disk.holds(item.id())),
        None => reachable.first(),
    };
    disk.map(|disk| disk.id())
}

fn cpu_capacity(cpu_shares: &[f64], consumers: usize) -> f64 {
    if cpu_shares.is_empty() {
        return 0.;
    }
    let total: f64 = cpu_shares.iter().sum();
    total / consumers.max(cpu_shares.len()) as f64
}

/// Time until one of the task dimensions with remaining work is complete.
///
/// Dimensions without remaining work or without throughput are ignored, infinity is returned if no dimension
/// progresses.
fn time_to_next_event(task: &ScheduledTask, cpu_capacity: f64, io_capacity: f64) -> f64 {
    let mut time = f64::INFINITY;
    let remaining_cpu = task.remaining_cpu();
    if remaining_cpu > 0 && cpu_capacity > 0. {
        time = time.min(remaining_cpu as f64 / cpu_capacity);
    }
    let remaining_io = task.remaining_io();
    if remaining_io > 0 && io_capacity > 0. {
        time = time.min(remaining_io as f64 / io_capacity);
    }
    time
}

/// Time-shared scheduler of tasks competing for VM CPU and disks.
pub struct DualResourceScheduler {
    name: String,
    vm_id: VmId,
    exec: Vec<ScheduledTask>,
    paused: Vec<ScheduledTask>,
    finished: VecDeque<ScheduledTask>,
    failed: VecDeque<ScheduledTask>,
    reachable_disks: Vec<DiskElement>,
    cpu_shares: Vec<f64>,
    io_shares: Vec<(DiskId, f64)>,
    previous_time: f64,
    next_pe: usize,
    min_time_between_events: f64,
    fail_on_unreachable_data: bool,
}

impl DualResourceScheduler {
    /// Creates scheduler for the given VM.
    ///
    /// Invalid minimal delay between events is replaced with the default one.
    pub fn new(name: &str, vm_id: VmId, config: &SimulationConfig) -> Self {
        let mut scheduler = Self {
            name: name.to_string(),
            vm_id,
            exec: Vec::new(),
            paused: Vec::new(),
            finished: VecDeque::new(),
            failed: VecDeque::new(),
            reachable_disks: Vec::new(),
            cpu_shares: Vec::new(),
            io_shares: Vec::new(),
            previous_time: 0.,
            next_pe: 0,
            min_time_between_events: config.min_time_between_events,
            fail_on_unreachable_data: config.fail_on_unreachable_data,
        };
        if let Err(e) = config.validate() {
            log_warn!(
                scheduler,
                "{}, using min_time_between_events = {}",
                e,
                DEFAULT_MIN_TIME_BETWEEN_EVENTS
            );
            scheduler.min_time_between_events = DEFAULT_MIN_TIME_BETWEEN_EVENTS;
        }
        scheduler
    }

    /// Returns the minimal delay between consecutive scheduler events.
    pub fn min_time_between_events(&self) -> f64 {
        self.min_time_between_events
    }

    fn cpu_consumers(&self) -> usize {
        self.exec.iter().filter(|task| task.remaining_cpu() > 0).count()
    }

    fn io_consumers(&self, disk_id: DiskId) -> usize {
        self.exec
            .iter()
            .filter(|task| task.disk_id() == Some(disk_id) && task.remaining_io() > 0)
            .count()
    }

    fn io_share(&self, disk_id: DiskId) -> f64 {
        self.io_shares
            .iter()
            .find(|(id, _)| *id == disk_id)
            .map(|(_, share)| *share)
            .unwrap_or(0.)
    }

    /// Per-task I/O throughput of each disk used by running tasks.
    fn io_capacities(&self, io_shares: &[(DiskId, f64)]) -> FxHashMap<DiskId, f64> {
        let mut consumers: FxHashMap<DiskId, usize> = FxHashMap::default();
        for task in &self.exec {
            if let Some(disk_id) = task.disk_id() {
                if task.remaining_io() > 0 {
                    *consumers.entry(disk_id).or_default() += 1;
                }
            }
        }
        io_shares
            .iter()
            .filter_map(|(disk_id, share)| consumers.get(disk_id).map(|count| (*disk_id, share / *count as f64)))
            .collect()
    }

    fn to_event_time(&self, now: f64, delay: f64) -> f64 {
        if delay.is_finite() {
            now + delay.max(self.min_time_between_events)
        } else {
            f64::INFINITY
        }
    }

    /// Predicts the next event time of a task which is about to join the running ones.
    fn predict(&self, task: &ScheduledTask) -> f64 {
        let now = self.previous_time;
        if task.is_done() {
            return now;
        }
        let cpu_capacity = cpu_capacity(&self.cpu_shares, self.cpu_consumers() + 1);
        let io_capacity = task
            .disk_id()
            .map(|disk_id| self.io_share(disk_id) / (self.io_consumers(disk_id) + 1) as f64)
            .unwrap_or(0.);
        self.to_event_time(now, time_to_next_event(task, cpu_capacity, io_capacity))
    }

    fn collect_done(&mut self, now: f64) {
        let (done, running): (Vec<_>, Vec<_>) = mem::take(&mut self.exec).into_iter().partition(|task| task.is_done());
        self.exec = running;
        for mut task in done {
            task.finalize(now);
            log_debug!(
                self,
                "task #{} finished in {:.3}",
                task.id(),
                now - task.exec_start_time()
            );
            self.finished.push_back(task);
        }
    }

    fn next_event_time(&self, now: f64) -> f64 {
        let cpu_capacity = cpu_capacity(&self.cpu_shares, self.cpu_consumers());
        let io_capacities = self.io_capacities(&self.io_shares);
        let delay = self
            .exec
            .iter()
            .map(|task| {
                let io_capacity = task
                    .disk_id()
                    .and_then(|disk_id| io_capacities.get(&disk_id).copied())
                    .unwrap_or(0.);
                time_to_next_event(task, cpu_capacity, io_capacity)
            })
            .fold(f64::INFINITY, f64::min);
        self.to_event_time(now, delay)
    }
}

impl TaskScheduler for DualResourceScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn time(&self) -> f64 {
        self.previous_time
    }

    fn submit(&mut self, task: Task, file_transfer_time: f64) -> Option<f64> {
        let now = self.previous_time;
        let disk_id = resolve_disk(&task, &self.reachable_disks);
        let mut scheduled = ScheduledTask::new(task, self.vm_id, now);
        if scheduled.remaining_io() > 0 && disk_id.is_none() {
            if self.fail_on_unreachable_data {
                log_warn!(
                    self,
                    "task #{} failed: data is not reachable from vm #{}",
                    scheduled.id(),
                    self.vm_id
                );
                scheduled.fail(TaskFailReason::DataUnreachable, now);
                self.failed.push_back(scheduled);
                return None;
            }
            log_warn!(
                self,
                "task #{} data is not reachable from vm #{}, its I/O will not progress",
                scheduled.id(),
                self.vm_id
            );
        }

        let pe_index = if self.cpu_shares.is_empty() {
            0
        } else {
            self.next_pe % self.cpu_shares.len()
        };
        self.next_pe += 1;
        scheduled.assign(pe_index, disk_id);
        if file_transfer_time > 0. {
            let capacity = cpu_capacity(&self.cpu_shares, self.cpu_consumers() + 1);
            scheduled.extend_cpu(capacity * file_transfer_time);
        }

        let predicted = self.predict(&scheduled);
        log_debug!(
            self,
            "task #{} submitted: cpu {} MI, io {} ops on disk {:?}, next event at {:.3}",
            scheduled.id(),
            scheduled.cpu_length(),
            scheduled.remaining_io(),
            disk_id,
            predicted
        );
        self.exec.push(scheduled);
        Some(predicted)
    }

    fn advance(&mut self, now: f64, cpu_shares: &[f64], io_shares: &[(DiskId, f64)]) -> f64 {
        let elapsed = now - self.previous_time;
        if elapsed > 0. && !self.exec.is_empty() {
            let cpu_capacity = cpu_capacity(cpu_shares, self.cpu_consumers());
            let io_capacities = self.io_capacities(io_shares);
            // progress of every task is computed before any task is updated,
            // so tasks completing during this step do not affect the others
            let deltas: Vec<(f64, f64)> = self
                .exec
                .iter()
                .map(|task| {
                    let cpu = if task.remaining_cpu() > 0 {
                        cpu_capacity * elapsed
                    } else {
                        0.
                    };
                    let io = match task.disk_id() {
                        Some(disk_id) if task.remaining_io() > 0 => {
                            io_capacities.get(&disk_id).copied().unwrap_or(0.) * elapsed
                        }
                        _ => 0.,
                    };
                    (cpu, io)
                })
                .collect();
            for (task, (cpu, io)) in self.exec.iter_mut().zip(deltas) {
                task.progress(cpu, io);
            }
            log_trace!(
                self,
                "advanced {} tasks by {:.3}, cpu capacity per task {:.3}",
                self.exec.len(),
                elapsed,
                cpu_capacity
            );
        }
        if now > self.previous_time {
            self.previous_time = now;
        }
        self.cpu_shares = cpu_shares.to_vec();
        self.io_shares = io_shares.to_vec();

        let now = self.previous_time;
        self.collect_done(now);
        self.next_event_time(now)
    }

    fn cancel(&mut self, task_id: TaskId) -> Option<ScheduledTask> {
        let now = self.previous_time;
        if let Some(pos) = self.finished.iter().position(|task| task.id() == task_id) {
            return self.finished.remove(pos);
        }
        let mut task = if let Some(pos) = self.exec.iter().position(|task| task.id() == task_id) {
            self.exec.remove(pos)
        } else if let Some(pos) = self.paused.iter().position(|task| task.id() == task_id) {
            self.paused.remove(pos)
        } else {
            return None;
        };
        if !task.finalize(now) {
            task.cancel(now);
        }
        log_debug!(self, "task #{} removed with status {}", task_id, task.status());
        Some(task)
    }

    fn pause(&mut self, task_id: TaskId) -> bool {
        let now = self.previous_time;
        let pos = match self.exec.iter().position(|task| task.id() == task_id) {
            Some(pos) => pos,
            None => return false,
        };
        let mut task = self.exec.remove(pos);
        if task.finalize(now) {
            log_debug!(self, "task #{} is already done, not pausing", task_id);
            self.finished.push_back(task);
        } else {
            log_debug!(self, "task #{} paused", task_id);
            task.pause();
            self.paused.push(task);
        }
        true
    }

    fn resume(&mut self, task_id: TaskId) -> Option<f64> {
        let pos = self.paused.iter().position(|task| task.id() == task_id)?;
        let mut task = self.paused.remove(pos);
        task.resume();
        let predicted = self.predict(&task);
        log_debug!(self, "task #{} resumed, next event at {:.3}", task_id, predicted);
        self.exec.push(task);
        Some(predicted)
    }

    fn fail_all(&mut self, reason: TaskFailReason) -> usize {
        let now = self.previous_time;
        let tasks: Vec<ScheduledTask> = self.exec.drain(..).chain(self.paused.drain(..)).collect();
        let count = tasks.len();
        for mut task in tasks {
            task.fail(reason, now);
            self.failed.push_back(task);
        }
        if count > 0 {
            log_warn!(self, "{} tasks of vm #{} failed: {}", count, self.vm_id, reason);
        }
        count
    }

    fn running_count(&self) -> usize {
        self.exec.len()
    }

    fn paused_count(&self) -> usize {
        self.paused.len()
    }

    fn is_finished_available(&self) -> bool {
        !self.finished.is_empty()
    }

    fn get_next_finished(&mut self) -> Option<ScheduledTask> {
        self.finished.pop_front()
    }

    fn take_failed(&mut self) -> Vec<ScheduledTask> {
        self.failed.drain(..).collect()
    }

    fn task(&self, task_id: TaskId) -> Option<&ScheduledTask> {
        self.exec
            .iter()
            .chain(self.paused.iter())
            .find(|task| task.id() == task_id)
    }

    fn set_reachable_disks(&mut self, disks: Vec<DiskElement>) {
        self.reachable_disks = disks;
        for task in self.exec.iter_mut().chain(self.paused.iter_mut()) {
            let disk_id = resolve_disk(task.task(), &self.reachable_disks);
            task.set_disk(disk_id);
        }
    }

    fn stalled_count(&self) -> usize {
        self.exec
            .iter()
            .chain(self.paused.iter())
            .filter(|task| task.is_stalled())
            .count()
    }

    fn ram_in_use(&self) -> u64 {
        self.exec.iter().chain(self.paused.iter()).map(|task| task.task().ram()).sum()
    }
}
