//! Task record and task input types.

use crate::output::{encode_failure, encode_success};
use crate::{CoreError, CourseId, EntryId, FailureReport, ProgressSnapshot, RunId, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record of one background update task.
///
/// Created and queued by the requester; the runner reads its input and
/// writes its final state and output exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Primary key.
    pub id: EntryId,

    /// Kind of update requested (e.g. `rescore_problem`).
    pub task_type: String,

    /// Course the task operates on.
    pub course_id: CourseId,

    /// Run id the task was dispatched under.
    pub task_id: RunId,

    /// Input parameters as a JSON string.
    pub task_input: String,

    /// Current task state.
    pub task_state: TaskState,

    /// Serialized progress snapshot or failure report.
    pub task_output: Option<String>,

    /// Who requested the task.
    pub requester: String,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task was last written.
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a new pending TaskRecord.
    pub fn new(
        id: EntryId,
        task_type: impl Into<String>,
        course_id: CourseId,
        input: &TaskInput,
        requester: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let now = Utc::now();
        Ok(Self {
            id,
            task_type: task_type.into(),
            course_id,
            task_id: RunId::generate(),
            task_input: serde_json::to_string(input)?,
            task_state: TaskState::Pending,
            task_output: None,
            requester: requester.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Builder method to set a specific run id (useful for testing).
    pub fn with_task_id(mut self, task_id: RunId) -> Self {
        self.task_id = task_id;
        self
    }

    /// Parse the stored input parameters.
    pub fn input(&self) -> Result<TaskInput, CoreError> {
        serde_json::from_str(&self.task_input)
            .map_err(|e| CoreError::InvalidInput(format!("task_input of entry {}: {e}", self.id)))
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.task_state.is_terminal()
    }

    /// Record successful completion with its final progress.
    pub fn complete(&mut self, progress: &ProgressSnapshot) -> Result<(), CoreError> {
        let output = encode_success(progress)?;
        self.transition(TaskState::Success)?;
        self.task_output = Some(output);
        Ok(())
    }

    /// Record an aborted run.
    pub fn fail(&mut self, report: &FailureReport) -> Result<(), CoreError> {
        let output = encode_failure(report)?;
        self.transition(TaskState::Failure)?;
        self.task_output = Some(output);
        Ok(())
    }

    /// Short description used in log lines and error messages.
    pub fn describe(&self) -> String {
        let problem = self
            .input()
            .ok()
            .and_then(|input| input.problem_url)
            .unwrap_or_default();
        format!(
            "task \"{}\": course \"{}\" problem \"{}\"",
            self.task_id, self.course_id, problem
        )
    }

    fn transition(&mut self, to: TaskState) -> Result<(), CoreError> {
        if self.task_state.is_terminal() {
            return Err(CoreError::InvalidStateTransition {
                from: self.task_state,
                to,
            });
        }
        self.task_state = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Input parameters of an update task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    /// Problem whose per-student state is updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_url: Option<String>,

    /// Restrict the update to one student, by username or email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<String>,
}

impl TaskInput {
    /// Input for an update over one problem.
    pub fn for_problem(problem_url: impl Into<String>) -> Self {
        Self {
            problem_url: Some(problem_url.into()),
            student: None,
        }
    }

    /// Builder method to restrict the update to one student.
    pub fn with_student(mut self, student: impl Into<String>) -> Self {
        self.student = Some(student.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskOutput;

    fn record() -> TaskRecord {
        let input = TaskInput::for_problem("i4x://MITx/6.002x/problem/p1").with_student("alice");
        TaskRecord::new(EntryId::new(1), "rescore_problem", CourseId::new("MITx/6.002x"), &input, "staff")
            .unwrap()
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = record();
        assert_eq!(record.task_state, TaskState::Pending);
        assert!(record.task_output.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_input_round_trip() {
        let input = record().input().unwrap();
        assert_eq!(input.problem_url.as_deref(), Some("i4x://MITx/6.002x/problem/p1"));
        assert_eq!(input.student.as_deref(), Some("alice"));
    }

    #[test]
    fn test_input_accepts_missing_keys() {
        let mut record = record();
        record.task_input = "{}".to_string();
        assert_eq!(record.input().unwrap(), TaskInput::default());

        record.task_input = "not json".to_string();
        assert!(matches!(record.input(), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_complete_writes_output_once() {
        let mut record = record();
        let progress = ProgressSnapshot::new("rescored", 0);
        record.complete(&progress).unwrap();

        assert_eq!(record.task_state, TaskState::Success);
        let output = TaskOutput::decode(record.task_output.as_deref().unwrap()).unwrap();
        assert_eq!(output, TaskOutput::Progress(progress.clone()));

        let err = record.fail(&FailureReport::new("Fatal", "late")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(record.task_state, TaskState::Success);
    }

    #[test]
    fn test_describe_names_task_and_problem() {
        let record = record().with_task_id(RunId::new("run-1"));
        assert_eq!(
            record.describe(),
            "task \"run-1\": course \"MITx/6.002x\" problem \"i4x://MITx/6.002x/problem/p1\""
        );
    }
}
