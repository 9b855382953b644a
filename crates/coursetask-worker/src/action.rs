//! Update actions: which enumerator and visitor run for each task type.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use coursetask_core::{EntryId, ProgressSnapshot};

use crate::context::ExecutionContext;
use crate::enumerator::{
    EnrolledStudentEnumerator, ModuleStateEnumerator, ModuleTarget, TargetFilter,
};
use crate::error::TaskError;
use crate::lifecycle::{load_error, TaskLifecycle};
use crate::store::{GradeStore, MemoryStore, ModuleStateStore, StudentDirectory, TaskStore};
use crate::visitor::{
    DeleteStateVisitor, Grader, OfflineGradeVisitor, RescoreVisitor, ResetAttemptsVisitor,
    StoredStateGrader,
};

/// Kind of update a task record asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    RescoreProblem,
    ResetProblemAttempts,
    DeleteProblemState,
    UpdateOfflineGrades,
}

impl TaskAction {
    pub const ALL: [TaskAction; 4] = [
        Self::RescoreProblem,
        Self::ResetProblemAttempts,
        Self::DeleteProblemState,
        Self::UpdateOfflineGrades,
    ];

    /// Parse the `task_type` stored on a task record.
    pub fn from_task_type(task_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.task_type() == task_type)
    }

    pub fn task_type(&self) -> &'static str {
        match self {
            Self::RescoreProblem => "rescore_problem",
            Self::ResetProblemAttempts => "reset_problem_attempts",
            Self::DeleteProblemState => "delete_problem_state",
            Self::UpdateOfflineGrades => "update_offline_grades",
        }
    }

    /// Past-tense verb reported as the snapshot's `action_name`.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::RescoreProblem => "rescored",
            Self::ResetProblemAttempts => "reset",
            Self::DeleteProblemState => "deleted",
            Self::UpdateOfflineGrades => "graded",
        }
    }

    /// Whether the input must name a problem.
    pub fn requires_problem(&self) -> bool {
        !matches!(self, Self::UpdateOfflineGrades)
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.task_type())
    }
}

/// Everything an action needs to run against one backend.
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskStore>,
    pub students: Arc<dyn StudentDirectory>,
    pub modules: Arc<dyn ModuleStateStore>,
    pub grades: Arc<dyn GradeStore>,
    pub grader: Arc<dyn Grader>,
}

impl Collaborators {
    /// Serve every collaborator from one store, grading from stored scores.
    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            tasks: store.clone(),
            students: store.clone(),
            modules: store.clone(),
            grades: store.clone(),
            grader: Arc::new(StoredStateGrader::new(store)),
        }
    }
}

/// Keeps only problems the student has submitted.
fn submitted_only() -> TargetFilter<ModuleTarget> {
    Box::new(|targets: Vec<ModuleTarget>| {
        targets
            .into_iter()
            .filter(|t| {
                t.module
                    .problem_state()
                    .ok()
                    .and_then(|state| state.get("done").and_then(Value::as_bool))
                    .unwrap_or(false)
            })
            .collect()
    })
}

/// Run the action named by task record `entry_id`.
///
/// A record whose `task_type` is not a known action is left untouched. The
/// task store is released on every path, dispatched or not.
pub async fn run_task(
    lifecycle: &TaskLifecycle,
    collaborators: &Collaborators,
    entry_id: EntryId,
    ctx: &ExecutionContext,
) -> Result<ProgressSnapshot, TaskError> {
    let record = match collaborators.tasks.load(entry_id).await {
        Ok(record) => record,
        Err(e) => {
            collaborators.tasks.release().await;
            return Err(load_error(e));
        }
    };
    let Some(action) = TaskAction::from_task_type(&record.task_type) else {
        collaborators.tasks.release().await;
        return Err(TaskError::UnsupportedTaskType(record.task_type));
    };
    debug!(entry_id = %entry_id, action = %action, "Dispatching task");

    let c = collaborators;
    let name = action.action_name();
    match action {
        TaskAction::RescoreProblem => {
            let enumerator = ModuleStateEnumerator::new(c.students.clone(), c.modules.clone());
            let visitor = RescoreVisitor::new(c.grader.clone(), c.modules.clone());
            let filter = submitted_only();
            lifecycle
                .run_update_task(entry_id, ctx, &enumerator, &visitor, name, Some(&filter))
                .await
        }
        TaskAction::ResetProblemAttempts => {
            let enumerator = ModuleStateEnumerator::new(c.students.clone(), c.modules.clone());
            let visitor = ResetAttemptsVisitor::new(c.modules.clone());
            lifecycle
                .run_update_task(entry_id, ctx, &enumerator, &visitor, name, None)
                .await
        }
        TaskAction::DeleteProblemState => {
            let enumerator = ModuleStateEnumerator::new(c.students.clone(), c.modules.clone());
            let visitor = DeleteStateVisitor::new(c.modules.clone());
            lifecycle
                .run_update_task(entry_id, ctx, &enumerator, &visitor, name, None)
                .await
        }
        TaskAction::UpdateOfflineGrades => {
            let enumerator = EnrolledStudentEnumerator::new(c.students.clone());
            let visitor =
                OfflineGradeVisitor::new(record.course_id.clone(), c.grader.clone(), c.grades.clone());
            lifecycle
                .run_update_task(entry_id, ctx, &enumerator, &visitor, name, None)
                .await
        }
    }
}
