//! The update loop: enumerate targets, visit each in order, publish progress.

use std::time::Instant;

use tracing::{debug, info};

use coursetask_core::{ProgressSnapshot, UpdateOutcome};

use crate::context::ExecutionContext;
use crate::enumerator::{enumerate, TargetEnumerator, TargetFilter, TargetQuery};
use crate::error::TaskError;
use crate::visitor::UpdateVisitor;

/// Counters of a run in progress plus its wall clock.
#[derive(Debug)]
pub struct ProgressTracker {
    progress: ProgressSnapshot,
    started: Instant,
}

impl ProgressTracker {
    /// Start the clock for a run over `total` targets.
    pub fn start(action_name: &str, total: usize, started: Instant) -> Self {
        Self {
            progress: ProgressSnapshot::new(action_name, total as u64),
            started,
        }
    }

    pub fn record(&mut self, outcome: UpdateOutcome) {
        self.progress.record(outcome);
    }

    /// Current counters with the elapsed time filled in.
    pub fn snapshot(&mut self) -> ProgressSnapshot {
        self.progress.duration_ms = self.started.elapsed().as_millis() as u64;
        self.progress.clone()
    }
}

/// Visit every target `enumerator` yields for `query`, in order.
///
/// A snapshot is published before the first visit and after each one. The
/// first error, from enumeration or from a visit, ends the run and is
/// returned unchanged; updates already made by earlier visits stay.
pub async fn run_updates<E, V>(
    ctx: &ExecutionContext,
    enumerator: &E,
    visitor: &V,
    query: &TargetQuery<'_>,
    action_name: &str,
    filter: Option<&TargetFilter<E::Target>>,
) -> Result<ProgressSnapshot, TaskError>
where
    E: TargetEnumerator + ?Sized,
    V: UpdateVisitor<Target = E::Target> + ?Sized,
{
    let started = Instant::now();
    let targets = enumerate(enumerator, query, filter).await?;

    let mut tracker = ProgressTracker::start(action_name, targets.len(), started);
    ctx.publish_progress(&tracker.snapshot()).await;

    for (index, target) in targets.iter().enumerate() {
        let step = Instant::now();
        let outcome = visitor.visit(ctx, target).await?;
        debug!(
            task_id = %ctx.run_id(),
            visitor = visitor.name(),
            index,
            outcome = %outcome,
            elapsed_ms = step.elapsed().as_millis() as u64,
            "Visited target"
        );
        tracker.record(outcome);
        ctx.publish_progress(&tracker.snapshot()).await;
    }

    let progress = tracker.snapshot();
    info!(
        task_id = %ctx.run_id(),
        action = %progress.action_name,
        course_id = %query.course_id,
        attempted = progress.attempted,
        succeeded = progress.succeeded,
        failed = progress.failed,
        skipped = progress.skipped,
        total = progress.total,
        duration_ms = progress.duration_ms,
        "Finished update"
    );
    Ok(progress)
}
