//! Tracking sink: audit events for every change a task makes to a student.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use coursetask_core::TrackingEvent;

#[async_trait]
pub trait TrackingSink: Send + Sync {
    async fn emit(&self, event: TrackingEvent);
}

/// Writes tracking events to the `tracking` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrackingSink;

#[async_trait]
impl TrackingSink for LogTrackingSink {
    async fn emit(&self, event: TrackingEvent) {
        let payload = serde_json::to_string(&event.event)
            .unwrap_or_else(|_| "failed to serialize".to_string());
        info!(
            target: "tracking",
            event_type = %event.event_type,
            student = %event.task_info.student,
            task_id = %event.task_info.task_id,
            payload = %payload,
            "Tracking event"
        );
    }
}

/// Keeps every emitted event, for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingTrackingSink {
    events: Mutex<Vec<TrackingEvent>>,
}

impl RecordingTrackingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl TrackingSink for RecordingTrackingSink {
    async fn emit(&self, event: TrackingEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
