use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use coursetask_core::event::{rescore_payload, PROBLEM_RESCORE};
use coursetask_core::UpdateOutcome;

use super::{Grader, UpdateVisitor};
use crate::context::ExecutionContext;
use crate::enumerator::ModuleTarget;
use crate::error::TaskError;
use crate::store::ModuleStateStore;

/// Rescores a student's submission to a problem.
///
/// A problem that cannot be loaded or rescored aborts the run. A rescoring
/// call that completes without a `correct`/`incorrect` verdict only fails
/// this target.
pub struct RescoreVisitor {
    grader: Arc<dyn Grader>,
    modules: Arc<dyn ModuleStateStore>,
}

impl RescoreVisitor {
    pub fn new(grader: Arc<dyn Grader>, modules: Arc<dyn ModuleStateStore>) -> Self {
        Self { grader, modules }
    }
}

#[async_trait]
impl UpdateVisitor for RescoreVisitor {
    type Target = ModuleTarget;

    fn name(&self) -> &'static str {
        "rescore"
    }

    async fn visit(
        &self,
        ctx: &ExecutionContext,
        target: &ModuleTarget,
    ) -> Result<UpdateOutcome, TaskError> {
        let module = &target.module;
        let rescore = self.grader.rescore(&target.student, module).await?;
        self.modules.save_module(&rescore.module).await?;

        match rescore.response.get("success") {
            None => {
                warn!(
                    course_id = %module.course_id,
                    problem = %module.module_state_key,
                    student = %target.student.username,
                    response = ?rescore.response,
                    "Error processing rescore call: unexpected response"
                );
                Ok(UpdateOutcome::Failed)
            }
            Some(Value::String(verdict)) if verdict == "correct" || verdict == "incorrect" => {
                ctx.track(
                    &target.student,
                    PROBLEM_RESCORE,
                    rescore_payload(verdict, rescore.module.grade, rescore.module.max_grade),
                )
                .await;
                debug!(
                    course_id = %module.course_id,
                    problem = %module.module_state_key,
                    student = %target.student.username,
                    verdict = %verdict,
                    "Successfully processed rescore call"
                );
                Ok(UpdateOutcome::Succeeded)
            }
            Some(other) => {
                warn!(
                    course_id = %module.course_id,
                    problem = %module.module_state_key,
                    student = %target.student.username,
                    verdict = %other,
                    "Error processing rescore call"
                );
                Ok(UpdateOutcome::Failed)
            }
        }
    }
}
