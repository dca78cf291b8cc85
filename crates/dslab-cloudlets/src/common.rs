use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::id::{DiskId, HostId, VmId};

/// Result of resource allocation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AllocationVerdict {
    Success,
    NotEnoughCpu,
    NotEnoughPes,
    NotEnoughIops,
    AffinityMismatch,
}

impl AllocationVerdict {
    pub fn is_success(&self) -> bool {
        *self == AllocationVerdict::Success
    }
}

impl Display for AllocationVerdict {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AllocationVerdict::Success => write!(f, "success"),
            AllocationVerdict::NotEnoughCpu => write!(f, "not enough cpu"),
            AllocationVerdict::NotEnoughPes => write!(f, "not enough processing elements"),
            AllocationVerdict::NotEnoughIops => write!(f, "not enough disk iops"),
            AllocationVerdict::AffinityMismatch => write!(f, "disk affinity does not match host disks"),
        }
    }
}

/// Error returned by [`CloudSimulation`](crate::CloudSimulation) operations.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SimulationError {
    HostNotFound(HostId),
    VmNotFound(VmId),
    DiskNotFound(DiskId),
    AllocationFailed(AllocationVerdict),
}

impl Display for SimulationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SimulationError::HostNotFound(id) => write!(f, "host #{} not found", id),
            SimulationError::VmNotFound(id) => write!(f, "vm #{} not found", id),
            SimulationError::DiskNotFound(id) => write!(f, "disk #{} not found", id),
            SimulationError::AllocationFailed(verdict) => write!(f, "allocation failed: {}", verdict),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Comparison tolerance for resource capacities.
pub(crate) const CAPACITY_EPS: f64 = 1e-9;
