//! Progress counters and per-target outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of visiting a single target.
///
/// These are the only results that let a run continue; anything else a
/// visitor reports is an error and aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOutcome {
    /// The update was performed.
    Succeeded,
    /// The update was attempted but did not complete for this target.
    Failed,
    /// Nothing needed to be done for this target.
    Skipped,
}

impl UpdateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time counters for a run.
///
/// Field names are the stable keys polled by the instructor dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Past-tense verb used in status messages (e.g. "rescored").
    pub action_name: String,
    /// Targets visited so far.
    pub attempted: u64,
    /// Targets whose update succeeded.
    pub succeeded: u64,
    /// Targets whose update failed without aborting the run.
    pub failed: u64,
    /// Targets that needed no update.
    pub skipped: u64,
    /// Targets enumerated before the first visit.
    pub total: u64,
    /// Wall-clock time since the run started.
    pub duration_ms: u64,
}

impl ProgressSnapshot {
    /// Create an all-zero snapshot for a run over `total` targets.
    pub fn new(action_name: impl Into<String>, total: u64) -> Self {
        Self {
            action_name: action_name.into(),
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            total,
            duration_ms: 0,
        }
    }

    /// Count one visited target.
    pub fn record(&mut self, outcome: UpdateOutcome) {
        self.attempted += 1;
        match outcome {
            UpdateOutcome::Succeeded => self.succeeded += 1,
            UpdateOutcome::Failed => self.failed += 1,
            UpdateOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Returns true if the counters are mutually consistent.
    pub fn is_consistent(&self) -> bool {
        self.attempted == self.succeeded + self.failed + self.skipped
            && self.attempted <= self.total
    }

    /// Returns true once every enumerated target has been visited.
    pub fn is_complete(&self) -> bool {
        self.attempted == self.total
    }
}
