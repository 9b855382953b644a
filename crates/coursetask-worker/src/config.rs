//! Worker configuration.

use std::path::PathBuf;

use crate::lifecycle::DEFAULT_MAX_TRACEBACK_LEN;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file holding tasks, students and module state.
    pub state_path: PathBuf,

    /// Longest traceback kept in a failure report.
    pub max_traceback_len: usize,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Stream task events as JSON lines on stdout.
    pub json_output: bool,

    /// Name recorded as the requester of submitted tasks.
    pub requester: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("coursetask-state.json"),
            max_traceback_len: DEFAULT_MAX_TRACEBACK_LEN,
            log_level: "info".to_string(),
            json_output: false,
            requester: "coursetask".to_string(),
        }
    }
}
