//! Core domain errors.

use thiserror::Error;

use crate::TaskState;

/// Core domain errors for CourseTask.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskState, to: TaskState },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialized task output exceeds the column bound.
    #[error("Task output too long: {len} > {max}")]
    OutputTooLong { len: usize, max: usize },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
