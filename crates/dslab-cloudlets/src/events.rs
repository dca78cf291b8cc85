//! Simulation events.

use serde::Serialize;

use crate::id::TaskId;

/// Task reaches its VM after the submission delay.
#[derive(Clone, Serialize)]
pub struct TaskArrived {
    pub task_id: TaskId,
}

/// VM scheduler reaches its predicted next event time.
#[derive(Clone, Serialize)]
pub struct SchedulerWakeup {}

/// End of a bounded simulation run.
#[derive(Clone, Serialize)]
pub struct Checkpoint {}
