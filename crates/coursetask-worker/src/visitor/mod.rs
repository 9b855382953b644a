//! Per-target update operations.
//!
//! A visitor performs at most one persisted mutation and one tracking event
//! per target and classifies the result as an [`UpdateOutcome`]. Returning an
//! error aborts the whole run; there is no per-target catch.

mod delete_state;
mod grader;
mod offline_grade;
mod rescore;
mod reset_attempts;

pub use delete_state::DeleteStateVisitor;
pub use grader::{Grader, Rescore, StoredStateGrader};
pub use offline_grade::OfflineGradeVisitor;
pub use rescore::RescoreVisitor;
pub use reset_attempts::ResetAttemptsVisitor;

use async_trait::async_trait;

use coursetask_core::UpdateOutcome;

use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Operation applied to every enumerated target of a run.
#[async_trait]
pub trait UpdateVisitor: Send + Sync {
    type Target: Send + Sync;

    /// Visitor name used in logs.
    fn name(&self) -> &'static str;

    /// Update one target.
    async fn visit(
        &self,
        ctx: &ExecutionContext,
        target: &Self::Target,
    ) -> Result<UpdateOutcome, TaskError>;
}
