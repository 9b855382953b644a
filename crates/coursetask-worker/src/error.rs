//! Worker error types.

use std::error::Error as _;

use coursetask_core::{CoreError, EntryId, ModuleId, RunId, TaskState};
use thiserror::Error;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No task record with this key.
    #[error("Task entry not found: {0}")]
    EntryNotFound(EntryId),

    /// No student module row with this key.
    #[error("Student module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// Failed to read or write the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode or decode stored data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a [`Grader`](crate::visitor::Grader).
#[derive(Debug, Error)]
pub enum GraderError {
    /// The problem could not be loaded for the student.
    #[error("No module {module_state_key} for student {student}--access denied?")]
    ModuleUnavailable {
        module_state_key: String,
        student: String,
    },

    /// The problem type cannot be rescored.
    #[error("Specified problem does not support rescoring: {0}")]
    RescoreUnsupported(String),

    /// One of the student's modules could not be instantiated for grading.
    #[error("Unable to instantiate module for grading: {0}")]
    ModuleInstantiation(String),

    /// Stored problem state could not be interpreted.
    #[error("Invalid problem state: {0}")]
    InvalidState(#[from] CoreError),

    /// Storage failed underneath the grader.
    #[error("Grader storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort an update task.
///
/// Anything that is not a classified per-target outcome ends up here and
/// stops the whole run.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task record does not exist; nothing can be written.
    #[error("Task entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The task record already reached a terminal state.
    #[error("Task entry {entry_id} already finished with state {state}")]
    AlreadyFinished { entry_id: EntryId, state: TaskState },

    /// The executing run is not the run the record was dispatched under.
    #[error("Requested task \"{requested}\" did not match actual task \"{actual}\": {task_info}")]
    RunMismatch {
        requested: RunId,
        actual: RunId,
        task_info: String,
    },

    /// The student named in the task input does not exist.
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    /// The task input is not meaningful for this update.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The task record names an update this worker does not perform.
    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),

    /// A target cannot be processed and no further targets should be tried.
    #[error("{0}")]
    UpdateState(String),

    #[error("Grader error: {0}")]
    Grader(#[from] GraderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl TaskError {
    /// Error category recorded as `exception` in a failure report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntryNotFound(_) => "EntryNotFound",
            Self::AlreadyFinished { .. } => "AlreadyFinished",
            Self::RunMismatch { .. } => "RunMismatch",
            Self::StudentNotFound(_) => "StudentNotFound",
            Self::InvalidInput(_) => "InvalidInput",
            Self::UnsupportedTaskType(_) => "UnsupportedTaskType",
            Self::UpdateState(_) => "UpdateStateError",
            Self::Grader(_) => "GraderError",
            Self::Store(_) => "StoreError",
            Self::Core(_) => "CoreError",
        }
    }

    /// Render the error and its chain of sources, outermost first.
    pub fn traceback(&self) -> String {
        let mut trace = format!("{}: {}", self.kind(), self);
        let mut source = self.source();
        while let Some(cause) = source {
            trace.push_str("\n  caused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        trace
    }
}
