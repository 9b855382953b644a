use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use coursetask_core::event::{delete_state_payload, PROBLEM_DELETE_STATE};
use coursetask_core::UpdateOutcome;

use super::UpdateVisitor;
use crate::context::ExecutionContext;
use crate::enumerator::ModuleTarget;
use crate::error::TaskError;
use crate::store::ModuleStateStore;

/// Deletes a student's problem state. Fails the run only on storage errors.
pub struct DeleteStateVisitor {
    modules: Arc<dyn ModuleStateStore>,
}

impl DeleteStateVisitor {
    pub fn new(modules: Arc<dyn ModuleStateStore>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl UpdateVisitor for DeleteStateVisitor {
    type Target = ModuleTarget;

    fn name(&self) -> &'static str {
        "delete_state"
    }

    async fn visit(
        &self,
        ctx: &ExecutionContext,
        target: &ModuleTarget,
    ) -> Result<UpdateOutcome, TaskError> {
        self.modules.delete_module(target.module.id).await?;
        ctx.track(&target.student, PROBLEM_DELETE_STATE, delete_state_payload())
            .await;

        debug!(module_id = %target.module.id, "Deleted problem state");
        Ok(UpdateOutcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::tracking::RecordingTrackingSink;
    use coursetask_core::{ModuleId, RunId, Student, StudentModule};
    use serde_json::json;

    #[tokio::test]
    async fn test_deletes_and_tracks() {
        let store = Arc::new(MemoryStore::new());
        let module = StudentModule::new(1, 1, "course", "p1").with_state(r#"{"attempts": 1}"#);
        store.insert_module(module.clone()).await.unwrap();
        let target = ModuleTarget {
            student: Student::new(1, "alice", "alice@example.com"),
            module,
        };
        let tracking = Arc::new(RecordingTrackingSink::new());
        let ctx = ExecutionContext::new(RunId::new("run-1")).with_tracking(tracking.clone());

        let outcome = DeleteStateVisitor::new(store.clone())
            .visit(&ctx, &target)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Succeeded);
        assert!(store.get_module(ModuleId::new(1)).await.is_none());
        let events = tracking.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "problem_delete_state");
        assert_eq!(events[0].event, json!({}));
    }

    #[tokio::test]
    async fn test_storage_error_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let target = ModuleTarget {
            student: Student::new(1, "alice", "alice@example.com"),
            module: StudentModule::new(99, 1, "course", "p1"),
        };
        let ctx = ExecutionContext::new(RunId::new("run-1"));

        let err = DeleteStateVisitor::new(store)
            .visit(&ctx, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Store(StoreError::ModuleNotFound(_))));
    }
}
