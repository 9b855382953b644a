//! CourseTask Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Storage
//! - Async runtime
//! - Progress/tracking transports
//!
//! All types here describe background update tasks run against the
//! per-student state of a course.

pub mod error;
pub mod event;
pub mod ids;
pub mod output;
pub mod progress;
pub mod status;
pub mod target;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{TaskInfo, TrackingEvent};
pub use ids::{CourseId, EntryId, ModuleId, RunId, StudentId};
pub use output::{FailureReport, TaskOutput, MAX_TASK_OUTPUT_LEN};
pub use progress::{ProgressSnapshot, UpdateOutcome};
pub use status::TaskState;
pub use target::{Enrollment, OfflineGrade, Student, StudentModule};
pub use task::{TaskInput, TaskRecord};
