//! Task lifecycle: ties one run of the update loop to its task record.

use std::sync::Arc;

use tracing::{error, info, warn};

use coursetask_core::{EntryId, FailureReport, ProgressSnapshot, TaskRecord};

use crate::context::ExecutionContext;
use crate::enumerator::{TargetEnumerator, TargetFilter, TargetQuery};
use crate::error::{StoreError, TaskError};
use crate::json_output;
use crate::runner::run_updates;
use crate::store::TaskStore;
use crate::visitor::UpdateVisitor;

/// Default bound on the traceback kept in a failure report.
pub const DEFAULT_MAX_TRACEBACK_LEN: usize = 700;

/// Map a failed record load, keeping a missing record distinct from storage
/// failures.
pub(crate) fn load_error(e: StoreError) -> TaskError {
    match e {
        StoreError::EntryNotFound(id) => TaskError::EntryNotFound(id),
        other => TaskError::Store(other),
    }
}

/// Loads a task record, runs its update and writes the final state back.
///
/// The record is written exactly once per run: `SUCCESS` with the final
/// progress, or `FAILURE` with a report of the error that ended the run.
pub struct TaskLifecycle {
    tasks: Arc<dyn TaskStore>,
    max_traceback_len: usize,
}

impl TaskLifecycle {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            tasks,
            max_traceback_len: DEFAULT_MAX_TRACEBACK_LEN,
        }
    }

    /// Builder method to set the traceback bound.
    pub fn with_max_traceback_len(mut self, max_traceback_len: usize) -> Self {
        self.max_traceback_len = max_traceback_len;
        self
    }

    /// Run the update described by task record `entry_id`.
    ///
    /// Returns the final progress on success. On a fatal error the failure
    /// is persisted to the record and the original error is returned. A
    /// missing record or one already finished is returned as an error with
    /// nothing written.
    pub async fn run_update_task<E, V>(
        &self,
        entry_id: EntryId,
        ctx: &ExecutionContext,
        enumerator: &E,
        visitor: &V,
        action_name: &str,
        filter: Option<&TargetFilter<E::Target>>,
    ) -> Result<ProgressSnapshot, TaskError>
    where
        E: TargetEnumerator + ?Sized,
        V: UpdateVisitor<Target = E::Target> + ?Sized,
    {
        let result = self
            .execute(entry_id, ctx, enumerator, visitor, action_name, filter)
            .await;
        self.tasks.release().await;
        result
    }

    async fn execute<E, V>(
        &self,
        entry_id: EntryId,
        ctx: &ExecutionContext,
        enumerator: &E,
        visitor: &V,
        action_name: &str,
        filter: Option<&TargetFilter<E::Target>>,
    ) -> Result<ProgressSnapshot, TaskError>
    where
        E: TargetEnumerator + ?Sized,
        V: UpdateVisitor<Target = E::Target> + ?Sized,
    {
        let record = self.tasks.load(entry_id).await.map_err(load_error)?;

        if record.is_terminal() {
            warn!(
                entry_id = %entry_id,
                state = %record.task_state,
                "Task already finished, not running again"
            );
            return Err(TaskError::AlreadyFinished {
                entry_id,
                state: record.task_state,
            });
        }

        info!(
            entry_id = %entry_id,
            task_id = %ctx.run_id(),
            task_type = %record.task_type,
            course_id = %record.course_id,
            "Starting update task"
        );
        json_output::emit_task_started(entry_id.get(), ctx.run_id().as_str(), &record.task_type);

        match self.run(&record, ctx, enumerator, visitor, action_name, filter).await {
            Ok(progress) => self.succeed(record, ctx, progress).await,
            Err(e) => {
                self.fail(record, ctx, &e).await;
                Err(e)
            }
        }
    }

    async fn run<E, V>(
        &self,
        record: &TaskRecord,
        ctx: &ExecutionContext,
        enumerator: &E,
        visitor: &V,
        action_name: &str,
        filter: Option<&TargetFilter<E::Target>>,
    ) -> Result<ProgressSnapshot, TaskError>
    where
        E: TargetEnumerator + ?Sized,
        V: UpdateVisitor<Target = E::Target> + ?Sized,
    {
        let input = record.input()?;

        if ctx.run_id() != &record.task_id {
            return Err(TaskError::RunMismatch {
                requested: record.task_id.clone(),
                actual: ctx.run_id().clone(),
                task_info: record.describe(),
            });
        }

        let query = TargetQuery {
            course_id: &record.course_id,
            module_state_key: input.problem_url.as_deref(),
            student: input.student.as_deref(),
        };
        run_updates(ctx, enumerator, visitor, &query, action_name, filter).await
    }

    async fn succeed(
        &self,
        mut record: TaskRecord,
        ctx: &ExecutionContext,
        progress: ProgressSnapshot,
    ) -> Result<ProgressSnapshot, TaskError> {
        // complete() moves the record out of PENDING; failures below are
        // written from the copy taken before it.
        let pending = record.clone();

        // An output that does not fit takes the failure path.
        if let Err(e) = record.complete(&progress) {
            let err = TaskError::from(e);
            self.fail(pending, ctx, &err).await;
            return Err(err);
        }
        if let Err(e) = self.tasks.save(&record).await {
            let err = TaskError::from(e);
            self.fail(pending, ctx, &err).await;
            return Err(err);
        }

        info!(entry_id = %record.id, task_id = %ctx.run_id(), "Update task succeeded");
        json_output::emit_task_succeeded(ctx.run_id().as_str(), &progress);
        Ok(progress)
    }

    /// Persist a failure report for `err`. Errors while doing so are logged;
    /// the caller still returns the original error.
    async fn fail(&self, mut record: TaskRecord, ctx: &ExecutionContext, err: &TaskError) {
        let report = FailureReport::new(err.kind(), err.to_string())
            .with_traceback(err.traceback(), self.max_traceback_len);

        warn!(
            entry_id = %record.id,
            task_id = %ctx.run_id(),
            exception = %report.exception,
            message = %report.message,
            "Update task failed"
        );

        if let Err(e) = record.fail(&report) {
            error!(entry_id = %record.id, error = %e, "Failed to encode failure report");
            return;
        }
        if let Err(e) = self.tasks.save(&record).await {
            error!(entry_id = %record.id, error = %e, "Failed to save failure report");
            return;
        }
        json_output::emit_task_failed(ctx.run_id().as_str(), &report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::ModuleStateEnumerator;
    use crate::store::MemoryStore;
    use crate::visitor::ResetAttemptsVisitor;
    use coursetask_core::{
        CourseId, RunId, Student, StudentModule, TaskInput, TaskOutput, TaskState,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Task store that counts releases.
    struct CountingStore {
        inner: MemoryStore,
        releases: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TaskStore for CountingStore {
        async fn load(&self, entry_id: EntryId) -> Result<TaskRecord, StoreError> {
            self.inner.load(entry_id).await
        }

        async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.inner.save(record).await
        }

        async fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Task store whose disk fills up when a SUCCESS record is written.
    struct FullOnSuccessStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait::async_trait]
    impl TaskStore for FullOnSuccessStore {
        async fn load(&self, entry_id: EntryId) -> Result<TaskRecord, StoreError> {
            self.inner.load(entry_id).await
        }

        async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
            if record.task_state == TaskState::Success {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.save(record).await
        }
    }

    fn failure(record: &TaskRecord) -> FailureReport {
        match TaskOutput::decode(record.task_output.as_deref().unwrap()).unwrap() {
            TaskOutput::Failure(report) => report,
            other => panic!("unexpected output: {other:?}"),
        }
    }

    async fn seeded(input: TaskInput) -> (Arc<MemoryStore>, TaskRecord) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_student(Student::new(1, "alice", "alice@example.com"))
            .await
            .unwrap();
        store
            .insert_module(
                StudentModule::new(1, 1, "course", "p1").with_state(r#"{"attempts": 2}"#),
            )
            .await
            .unwrap();
        let record = TaskRecord::new(
            EntryId::new(1),
            "reset_problem_attempts",
            CourseId::new("course"),
            &input,
            "staff",
        )
        .unwrap();
        store.save(&record).await.unwrap();
        (store, record)
    }

    async fn run(store: &Arc<MemoryStore>, run_id: RunId) -> Result<ProgressSnapshot, TaskError> {
        let lifecycle = TaskLifecycle::new(store.clone());
        let ctx = ExecutionContext::new(run_id);
        let enumerator = ModuleStateEnumerator::new(store.clone(), store.clone());
        let visitor = ResetAttemptsVisitor::new(store.clone());
        lifecycle
            .run_update_task(EntryId::new(1), &ctx, &enumerator, &visitor, "reset", None)
            .await
    }

    #[tokio::test]
    async fn test_success_is_persisted() {
        let (store, record) = seeded(TaskInput::for_problem("p1")).await;

        let progress = run(&store, record.task_id.clone()).await.unwrap();
        assert_eq!(progress.succeeded, 1);

        let saved = store.load(EntryId::new(1)).await.unwrap();
        assert_eq!(saved.task_state, TaskState::Success);
        match TaskOutput::decode(saved.task_output.as_deref().unwrap()).unwrap() {
            TaskOutput::Progress(output) => assert_eq!(output, progress),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_record_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let err = run(&store, RunId::new("run-1")).await.unwrap_err();
        assert!(matches!(err, TaskError::EntryNotFound(_)));
        assert_eq!(store.task_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_input_fails_record() {
        let (store, mut record) = seeded(TaskInput::default()).await;
        record.task_input = "not json".to_string();
        store.save(&record).await.unwrap();

        let err = run(&store, record.task_id.clone()).await.unwrap_err();
        assert!(matches!(err, TaskError::Core(_)));

        let saved = store.load(EntryId::new(1)).await.unwrap();
        assert_eq!(saved.task_state, TaskState::Failure);
    }

    #[tokio::test]
    async fn test_release_called_on_every_path() {
        let (memory, record) = seeded(TaskInput::for_problem("p1")).await;
        let second = TaskRecord::new(
            EntryId::new(2),
            "reset_problem_attempts",
            CourseId::new("course"),
            &TaskInput::for_problem("p1"),
            "staff",
        )
        .unwrap();
        memory.save(&second).await.unwrap();
        let store = Arc::new(CountingStore {
            inner: MemoryStore::from_snapshot(memory.snapshot().await),
            releases: AtomicUsize::new(0),
        });
        let lifecycle = TaskLifecycle::new(store.clone());
        let enumerator = ModuleStateEnumerator::new(memory.clone(), memory.clone());
        let visitor = ResetAttemptsVisitor::new(memory.clone());

        // success, already finished, mismatch, missing
        let runs = [
            (record.id, record.task_id.clone()),
            (record.id, record.task_id.clone()),
            (second.id, RunId::new("stale")),
            (EntryId::new(9), record.task_id.clone()),
        ];
        for (entry_id, run_id) in runs {
            let ctx = ExecutionContext::new(run_id);
            let _ = lifecycle
                .run_update_task(entry_id, &ctx, &enumerator, &visitor, "reset", None)
                .await;
        }
        assert_eq!(store.releases.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_success_save_error_writes_failure() {
        let (memory, record) = seeded(TaskInput::for_problem("p1")).await;
        let store = Arc::new(FullOnSuccessStore {
            inner: memory.clone(),
        });
        let lifecycle = TaskLifecycle::new(store);
        let ctx = ExecutionContext::new(record.task_id.clone());
        let enumerator = ModuleStateEnumerator::new(memory.clone(), memory.clone());
        let visitor = ResetAttemptsVisitor::new(memory.clone());

        let err = lifecycle
            .run_update_task(record.id, &ctx, &enumerator, &visitor, "reset", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Store(StoreError::Io(_))));

        let saved = memory.load(record.id).await.unwrap();
        assert_eq!(saved.task_state, TaskState::Failure);
        let report = failure(&saved);
        assert_eq!(report.exception, "StoreError");
        assert!(report.message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_oversized_success_output_fails_record() {
        let (store, record) = seeded(TaskInput::for_problem("p1")).await;
        let lifecycle = TaskLifecycle::new(store.clone());
        let ctx = ExecutionContext::new(record.task_id.clone());
        let enumerator = ModuleStateEnumerator::new(store.clone(), store.clone());
        let visitor = ResetAttemptsVisitor::new(store.clone());
        let action_name = "x".repeat(2000);

        let err = lifecycle
            .run_update_task(record.id, &ctx, &enumerator, &visitor, &action_name, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Core(_)));

        let saved = store.load(record.id).await.unwrap();
        assert_eq!(saved.task_state, TaskState::Failure);
        assert_eq!(failure(&saved).exception, "CoreError");
        assert!(saved.task_output.unwrap().len() <= coursetask_core::MAX_TASK_OUTPUT_LEN);
    }

    #[tokio::test]
    async fn test_traceback_is_bounded() {
        let (store, record) = seeded(TaskInput::for_problem("p1")).await;
        let lifecycle = TaskLifecycle::new(store.clone()).with_max_traceback_len(20);
        let ctx = ExecutionContext::new(RunId::new("stale"));
        let enumerator = ModuleStateEnumerator::new(store.clone(), store.clone());
        let visitor = ResetAttemptsVisitor::new(store.clone());

        lifecycle
            .run_update_task(record.id, &ctx, &enumerator, &visitor, "reset", None)
            .await
            .unwrap_err();

        let saved = store.load(record.id).await.unwrap();
        match TaskOutput::decode(saved.task_output.as_deref().unwrap()).unwrap() {
            TaskOutput::Failure(report) => {
                assert_eq!(report.exception, "RunMismatch");
                assert!(report.traceback.unwrap().chars().count() <= 20);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }
}
