//! Records of finished tasks and aggregated simulation statistics.

use serde::Serialize;

use crate::id::{TaskId, VmId};
use crate::task::{ScheduledTask, TaskFailReason, TaskStatus};

/// Final state of a task which left its scheduler.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub vm_id: VmId,
    pub status: TaskStatus,
    pub fail_reason: Option<TaskFailReason>,
    pub submission_time: f64,
    pub exec_start_time: f64,
    pub finish_time: Option<f64>,
    pub cpu_length: u64,
    pub io_length: u64,
}

impl TaskResult {
    /// Returns the execution time of successfully completed task and `None` otherwise.
    pub fn exec_time(&self) -> Option<f64> {
        match (self.status, self.finish_time) {
            (TaskStatus::Success, Some(finish_time)) => Some(finish_time - self.exec_start_time),
            _ => None,
        }
    }
}

impl From<&ScheduledTask> for TaskResult {
    fn from(task: &ScheduledTask) -> Self {
        Self {
            task_id: task.id(),
            vm_id: task.vm_id(),
            status: task.status(),
            fail_reason: task.fail_reason(),
            submission_time: task.submission_time(),
            exec_start_time: task.exec_start_time(),
            finish_time: task.finish_time(),
            cpu_length: task.cpu_length(),
            io_length: task.task().total_io_length(),
        }
    }
}

/// Aggregated statistics over task results.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Latest finish time among successful tasks.
    pub makespan: f64,
    /// Mean execution time of successful tasks.
    pub mean_exec_time: f64,
}

impl SimulationStats {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut stats = Self {
            total: results.len(),
            ..Default::default()
        };
        let mut exec_time_sum = 0.;
        for result in results {
            match result.status {
                TaskStatus::Success => {
                    stats.succeeded += 1;
                    exec_time_sum += result.exec_time().unwrap_or(0.);
                    stats.makespan = stats.makespan.max(result.finish_time.unwrap_or(0.));
                }
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Canceled => stats.canceled += 1,
                TaskStatus::InExec | TaskStatus::Paused => {}
            }
        }
        if stats.succeeded > 0 {
            stats.mean_exec_time = exec_time_sum / stats.succeeded as f64;
        }
        stats
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
