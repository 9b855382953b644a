//! JSON output for streaming task events to stdout.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use coursetask_core::{FailureReport, ProgressSnapshot};

/// Global flag to enable JSON output mode.
static JSON_MODE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable JSON output mode.
pub fn enable_json_mode() {
    JSON_MODE_ENABLED.store(true, Ordering::SeqCst);
}

/// Check if JSON mode is enabled.
pub fn is_json_mode() -> bool {
    JSON_MODE_ENABLED.load(Ordering::SeqCst)
}

/// JSON event types that can be emitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    TaskStarted,
    Progress,
    TaskSucceeded,
    TaskFailed,
}

/// A JSON event to be output to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Create a new JSON event with the current timestamp.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// Output this event as a JSON line to stdout.
    pub fn emit(&self) {
        if !is_json_mode() {
            return;
        }
        if let Ok(json) = serde_json::to_string(self) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
            let _ = stdout.flush();
        }
    }
}

/// Emit a task_started event.
pub fn emit_task_started(entry_id: u64, task_id: &str, task_type: &str) {
    JsonEvent::new(
        JsonEventType::TaskStarted,
        serde_json::json!({
            "entry_id": entry_id,
            "task_id": task_id,
            "task_type": task_type,
        }),
    )
    .emit();
}

/// Emit a progress event.
pub fn emit_progress(task_id: &str, progress: &ProgressSnapshot) {
    JsonEvent::new(
        JsonEventType::Progress,
        serde_json::json!({
            "task_id": task_id,
            "progress": progress,
        }),
    )
    .emit();
}

/// Emit a task_succeeded event.
pub fn emit_task_succeeded(task_id: &str, progress: &ProgressSnapshot) {
    JsonEvent::new(
        JsonEventType::TaskSucceeded,
        serde_json::json!({
            "task_id": task_id,
            "progress": progress,
        }),
    )
    .emit();
}

/// Emit a task_failed event.
pub fn emit_task_failed(task_id: &str, report: &FailureReport) {
    JsonEvent::new(
        JsonEventType::TaskFailed,
        serde_json::json!({
            "task_id": task_id,
            "exception": report.exception,
            "message": report.message,
        }),
    )
    .emit();
}
