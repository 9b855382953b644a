//! Tracking events emitted when a task changes a student's state.

use crate::RunId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Event type emitted after resetting problem attempts.
pub const PROBLEM_RESET_ATTEMPTS: &str = "problem_reset_attempts";
/// Event type emitted after deleting problem state.
pub const PROBLEM_DELETE_STATE: &str = "problem_delete_state";
/// Event type emitted after rescoring a problem.
pub const PROBLEM_RESCORE: &str = "problem_rescore";
/// Event type emitted after storing an offline grade.
pub const OFFLINE_GRADE: &str = "offline_grade";

/// Task-side context attached to every tracking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Username of the affected student.
    pub student: String,
    /// Run that made the change.
    pub task_id: RunId,
}

impl TaskInfo {
    /// Create a new TaskInfo.
    pub fn new(student: impl Into<String>, task_id: RunId) -> Self {
        Self {
            student: student.into(),
            task_id,
        }
    }
}

/// A tracking event describing one change made by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Type of event.
    pub event_type: String,
    /// Request-side context forwarded from whoever submitted the task.
    pub request_info: Map<String, Value>,
    /// Task-side context.
    pub task_info: TaskInfo,
    /// Event-specific payload.
    pub event: Value,
    /// Unix timestamp (milliseconds) when the event occurred.
    pub timestamp_ms: i64,
}

impl TrackingEvent {
    /// Create a new tracking event.
    pub fn new(
        event_type: impl Into<String>,
        request_info: Map<String, Value>,
        task_info: TaskInfo,
        event: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            request_info,
            task_info,
            event,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Payload for a [`PROBLEM_RESET_ATTEMPTS`] event. `old_attempts` is
/// reported as stored, integer or not.
pub fn reset_attempts_payload(old_attempts: impl Into<Value>) -> Value {
    json!({ "old_attempts": old_attempts.into(), "new_attempts": 0 })
}

/// Payload for a [`PROBLEM_DELETE_STATE`] event.
pub fn delete_state_payload() -> Value {
    Value::Object(Map::new())
}

/// Payload for a [`PROBLEM_RESCORE`] event.
pub fn rescore_payload(success: &str, grade: Option<f64>, max_grade: Option<f64>) -> Value {
    json!({ "success": success, "new_score": grade, "new_total": max_grade })
}

/// Payload for an [`OFFLINE_GRADE`] event.
pub fn offline_grade_payload(created: bool) -> Value {
    json!({ "created": created })
}
