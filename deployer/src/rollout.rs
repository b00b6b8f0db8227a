//! Client-side view of a service rollout.
//!
//! The control plane owns the rollout. We only classify what `DescribeServices` reports
//! into `PENDING -> IN_PROGRESS -> {STEADY | FAILED}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the deployment that new tasks are launched from
pub const PRIMARY: &str = "PRIMARY";

/// Progress reported by the control plane for a single deployment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    InProgress,
    Completed,
    Failed,
}

/// One deployment of a service (the primary one and any still draining).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub id: String,
    /// `PRIMARY`, `ACTIVE` or `INACTIVE`
    pub status: String,
    pub task_definition: String,
    pub desired: u32,
    pub running: u32,
    pub pending: u32,
    pub failed: u32,
    pub progress: Option<Progress>,
    pub reason: Option<String>,
}

impl Deployment {
    pub fn is_primary(&self) -> bool {
        self.status == PRIMARY
    }
}

/// A snapshot of the service as reported by the control plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    pub service_arn: Option<String>,
    pub task_definition: String,
    pub desired: u32,
    pub running: u32,
    pub pending: u32,
    pub deployments: Vec<Deployment>,
}

impl Observation {
    pub fn primary(&self) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.is_primary())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RolloutState {
    Pending,
    InProgress,
    Steady,
    Failed,
}

impl RolloutState {
    /// Classifies an observation of a service that should converge on `target`.
    pub fn observe(observation: &Observation, target: &str) -> Self {
        let Some(primary) = observation.primary() else {
            return Self::Pending;
        };
        if primary.task_definition != target {
            return Self::Pending;
        }
        if primary.progress == Some(Progress::Failed) {
            return Self::Failed;
        }

        // Old deployments must be drained and every desired task running
        if observation.deployments.len() == 1
            && primary.running == primary.desired
            && primary.pending == 0
            && observation.running == observation.desired
        {
            return Self::Steady;
        }
        Self::InProgress
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Steady | Self::Failed)
    }

    /// Returns true if `next` may follow `self`.
    pub fn can_transition(&self, next: RolloutState) -> bool {
        match (self, next) {
            (a, b) if *a == b => true,
            (Self::Pending, _) => true,
            (Self::InProgress, Self::Steady | Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Steady => "STEADY",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}
