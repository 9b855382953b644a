use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use coursetask_core::event::{reset_attempts_payload, PROBLEM_RESET_ATTEMPTS};
use coursetask_core::UpdateOutcome;

use super::UpdateVisitor;
use crate::context::ExecutionContext;
use crate::enumerator::ModuleTarget;
use crate::error::TaskError;
use crate::store::ModuleStateStore;

/// Resets the attempt counter of a student's problem to zero.
///
/// Succeeds when a positive count was reset; skips when there is no count or
/// it is already zero.
pub struct ResetAttemptsVisitor {
    modules: Arc<dyn ModuleStateStore>,
}

impl ResetAttemptsVisitor {
    pub fn new(modules: Arc<dyn ModuleStateStore>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl UpdateVisitor for ResetAttemptsVisitor {
    type Target = ModuleTarget;

    fn name(&self) -> &'static str {
        "reset_attempts"
    }

    async fn visit(
        &self,
        ctx: &ExecutionContext,
        target: &ModuleTarget,
    ) -> Result<UpdateOutcome, TaskError> {
        let mut module = target.module.clone();
        let mut state = module.problem_state()?;

        // Any positive number counts, including floats and counts past i64.
        let old_attempts = match state.get("attempts") {
            Some(attempts) if attempts.as_f64().is_some_and(|a| a > 0.0) => attempts.clone(),
            _ => return Ok(UpdateOutcome::Skipped),
        };

        state.insert("attempts".to_string(), Value::from(0));
        module.set_problem_state(&state)?;
        self.modules.save_module(&module).await?;

        ctx.track(
            &target.student,
            PROBLEM_RESET_ATTEMPTS,
            reset_attempts_payload(old_attempts.clone()),
        )
        .await;

        debug!(module_id = %module.id, old_attempts = %old_attempts, "Reset problem attempts");
        Ok(UpdateOutcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tracking::RecordingTrackingSink;
    use coursetask_core::{ModuleId, RunId, Student, StudentModule};

    async fn setup(state: Option<&str>) -> (Arc<MemoryStore>, ModuleTarget) {
        let store = Arc::new(MemoryStore::new());
        let mut module = StudentModule::new(1, 1, "course", "p1");
        module.state = state.map(str::to_string);
        store.insert_module(module.clone()).await.unwrap();
        let target = ModuleTarget {
            student: Student::new(1, "alice", "alice@example.com"),
            module,
        };
        (store, target)
    }

    #[tokio::test]
    async fn test_resets_positive_attempts() {
        let (store, target) = setup(Some(r#"{"attempts": 3, "done": true}"#)).await;
        let tracking = Arc::new(RecordingTrackingSink::new());
        let ctx = ExecutionContext::new(RunId::new("run-1")).with_tracking(tracking.clone());

        let outcome = ResetAttemptsVisitor::new(store.clone())
            .visit(&ctx, &target)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Succeeded);

        let saved = store.get_module(ModuleId::new(1)).await.unwrap();
        let state = saved.problem_state().unwrap();
        assert_eq!(state["attempts"], 0);
        assert_eq!(state["done"], true);

        let events = tracking.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "problem_reset_attempts");
        assert_eq!(events[0].event["old_attempts"], 3);
        assert_eq!(events[0].event["new_attempts"], 0);
    }

    #[tokio::test]
    async fn test_resets_non_integer_attempts() {
        for (stored, expected) in [
            ("2.0", serde_json::json!(2.0)),
            ("0.5", serde_json::json!(0.5)),
            ("18446744073709551615", serde_json::json!(u64::MAX)),
        ] {
            let (store, target) = setup(Some(&format!(r#"{{"attempts": {stored}}}"#))).await;
            let tracking = Arc::new(RecordingTrackingSink::new());
            let ctx = ExecutionContext::new(RunId::new("run-1")).with_tracking(tracking.clone());

            let outcome = ResetAttemptsVisitor::new(store.clone())
                .visit(&ctx, &target)
                .await
                .unwrap();
            assert_eq!(outcome, UpdateOutcome::Succeeded);

            let saved = store.get_module(ModuleId::new(1)).await.unwrap();
            assert_eq!(saved.problem_state().unwrap()["attempts"], 0);
            assert_eq!(tracking.events()[0].event["old_attempts"], expected);
        }
    }

    #[tokio::test]
    async fn test_skips_zero_or_missing_attempts() {
        for state in [
            Some(r#"{"attempts": 0}"#),
            Some(r#"{"attempts": -1.5}"#),
            Some(r#"{"attempts": "3"}"#),
            Some("{}"),
            None,
        ] {
            let (store, target) = setup(state).await;
            let tracking = Arc::new(RecordingTrackingSink::new());
            let ctx = ExecutionContext::new(RunId::new("run-1")).with_tracking(tracking.clone());

            let outcome = ResetAttemptsVisitor::new(store.clone())
                .visit(&ctx, &target)
                .await
                .unwrap();
            assert_eq!(outcome, UpdateOutcome::Skipped);
            assert_eq!(store.get_module(ModuleId::new(1)).await.unwrap(), target.module);
            assert!(tracking.events().is_empty());
        }
    }
}
