//! CourseTask worker: runs per-student update tasks with progress tracking.
//!
//! A task record names an update action over a course. The worker enumerates
//! the targets of the action, visits them one by one while publishing
//! progress, and writes the outcome back to the record.

pub mod action;
pub mod config;
pub mod context;
pub mod enumerator;
pub mod error;
pub mod json_output;
pub mod lifecycle;
pub mod metrics;
pub mod progress;
pub mod runner;
pub mod store;
pub mod tracking;
pub mod visitor;

pub use action::{run_task, Collaborators, TaskAction};
pub use config::Config;
pub use context::ExecutionContext;
pub use error::{GraderError, StoreError, TaskError};
pub use lifecycle::TaskLifecycle;
pub use runner::{run_updates, ProgressTracker};
pub use store::MemoryStore;
