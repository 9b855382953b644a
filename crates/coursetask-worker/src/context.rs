//! Execution context handed to every stage of a run.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use coursetask_core::{ProgressSnapshot, RunId, Student, TaskInfo, TrackingEvent};

use crate::progress::{LogProgressSink, ProgressSink};
use crate::tracking::{LogTrackingSink, TrackingSink};

/// Identity and side channels of the executing run.
///
/// Passed explicitly instead of being looked up from ambient state, so that
/// the run id checked against the task record is the one that also tags
/// progress and tracking output.
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: RunId,
    request_info: Map<String, Value>,
    progress: Arc<dyn ProgressSink>,
    tracking: Arc<dyn TrackingSink>,
}

impl ExecutionContext {
    /// Create a context for `run_id` that logs progress and tracking events.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            request_info: Map::new(),
            progress: Arc::new(LogProgressSink),
            tracking: Arc::new(LogTrackingSink),
        }
    }

    /// Id of the executing run.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Request-side context forwarded into tracking events.
    pub fn request_info(&self) -> &Map<String, Value> {
        &self.request_info
    }

    /// Replace the request info and return updated context.
    pub fn with_request_info(mut self, request_info: Map<String, Value>) -> Self {
        self.request_info = request_info;
        self
    }

    /// Replace the progress sink and return updated context.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the tracking sink and return updated context.
    pub fn with_tracking(mut self, tracking: Arc<dyn TrackingSink>) -> Self {
        self.tracking = tracking;
        self
    }

    /// Publish a progress snapshot under this run's id.
    pub async fn publish_progress(&self, snapshot: &ProgressSnapshot) {
        self.progress.publish(&self.run_id, snapshot).await;
    }

    /// Emit a tracking event about a change made to `student`.
    pub async fn track(&self, student: &Student, event_type: &str, payload: Value) {
        let task_info = TaskInfo::new(student.username.clone(), self.run_id.clone());
        let event = TrackingEvent::new(event_type, self.request_info.clone(), task_info, payload);
        self.tracking.emit(event).await;
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("request_info_len", &self.request_info.len())
            .field("progress", &"<sink>")
            .field("tracking", &"<sink>")
            .finish()
    }
}
