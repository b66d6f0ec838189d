// Run status state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal run status transition: {from} -> {to}")]
pub struct RunStatusError {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Statuses reachable from `from` in one step. Terminal states have none.
pub fn allowed_transitions(from: RunStatus) -> &'static [RunStatus] {
    use RunStatus::*;
    match from {
        Pending => &[Running],
        Running => &[Completed, Failed],
        Completed | Failed => &[],
    }
}

pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), RunStatusError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RunStatusError { from, to })
    }
}
