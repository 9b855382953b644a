//! Progress channel: where in-flight snapshots of a run are published.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use coursetask_core::{ProgressSnapshot, RunId};

use crate::json_output;

/// Best-effort channel for publishing a run's progress to observers.
///
/// Publishing never fails from the runner's point of view; delivery is the
/// sink's concern.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, run_id: &RunId, snapshot: &ProgressSnapshot);
}

/// Publishes progress as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn publish(&self, run_id: &RunId, snapshot: &ProgressSnapshot) {
        info!(
            task_id = %run_id,
            action = %snapshot.action_name,
            attempted = snapshot.attempted,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            skipped = snapshot.skipped,
            total = snapshot.total,
            duration_ms = snapshot.duration_ms,
            "Task progress"
        );
    }
}

/// Publishes progress as JSON lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProgressSink;

#[async_trait]
impl ProgressSink for JsonProgressSink {
    async fn publish(&self, run_id: &RunId, snapshot: &ProgressSnapshot) {
        json_output::emit_progress(run_id.as_str(), snapshot);
    }
}

/// Keeps every published snapshot, for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    published: Mutex<Vec<(RunId, ProgressSnapshot)>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots published so far, in order.
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.lock().iter().map(|(_, s)| s.clone()).collect()
    }

    /// Run ids the snapshots were published under, in order.
    pub fn run_ids(&self) -> Vec<RunId> {
        self.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(RunId, ProgressSnapshot)>> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProgressSink for RecordingProgressSink {
    async fn publish(&self, run_id: &RunId, snapshot: &ProgressSnapshot) {
        self.lock().push((run_id.clone(), snapshot.clone()));
    }
}
