//! Task state enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a task record.
///
/// `Pending`, `Running` and `Progress` are owned by the queue that dispatches
/// tasks; the runner only ever writes `Success` or `Failure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Task queued but not yet picked up.
    #[default]
    Pending,
    /// Task picked up by a worker.
    Running,
    /// Task is publishing in-flight progress.
    Progress,
    /// Task completed; output holds a progress snapshot.
    Success,
    /// Task aborted; output holds a failure report.
    Failure,
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Returns true if the task may still be executed.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Progress => "PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
