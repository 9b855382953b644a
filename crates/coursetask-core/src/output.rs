//! Encoding of the bounded `task_output` column.
//!
//! A finished task stores either its final [`ProgressSnapshot`] or a
//! [`FailureReport`] as JSON. The column holds at most
//! [`MAX_TASK_OUTPUT_LEN`] bytes: success output that does not fit is an
//! error, failure output is shortened until it fits.

use serde::{Deserialize, Serialize};

use crate::{CoreError, ProgressSnapshot};

/// Maximum length of the serialized task output.
pub const MAX_TASK_OUTPUT_LEN: usize = 1024;

/// Marker appended to shortened strings.
const TRUNCATION_TAG: &str = "...";

/// Description of the error that aborted a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Name of the error category.
    pub exception: String,
    /// Error message.
    pub message: String,
    /// Error trace, omitted when it had to be dropped to fit the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl FailureReport {
    /// Create a new FailureReport.
    pub fn new(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            message: message.into(),
            traceback: None,
        }
    }

    /// Builder method to attach a traceback bounded to `max_len` bytes.
    ///
    /// A traceback that only fits as the truncation marker is dropped.
    pub fn with_traceback(mut self, traceback: impl Into<String>, max_len: usize) -> Self {
        let traceback = traceback.into();
        self.traceback = if traceback.len() <= max_len {
            Some(traceback)
        } else if max_len <= TRUNCATION_TAG.len() {
            None
        } else {
            let excess = traceback.len() - max_len;
            Some(shorten(&traceback, excess))
        };
        self
    }
}

/// Decoded contents of a task output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Progress(ProgressSnapshot),
    Failure(FailureReport),
}

impl TaskOutput {
    /// Decode a stored output string.
    pub fn decode(output: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(output)?)
    }
}

/// Serialize a success snapshot for storage.
pub fn encode_success(progress: &ProgressSnapshot) -> Result<String, CoreError> {
    let json = serde_json::to_string(progress)?;
    if json.len() > MAX_TASK_OUTPUT_LEN {
        return Err(CoreError::OutputTooLong {
            len: json.len(),
            max: MAX_TASK_OUTPUT_LEN,
        });
    }
    Ok(json)
}

/// Serialize a failure report for storage, shortening it to fit.
///
/// The traceback is cut first (and dropped when it cannot shrink enough),
/// then the message.
pub fn encode_failure(report: &FailureReport) -> Result<String, CoreError> {
    let mut report = report.clone();
    let mut json = serde_json::to_string(&report)?;

    while json.len() > MAX_TASK_OUTPUT_LEN {
        let excess = json.len() - MAX_TASK_OUTPUT_LEN;

        if let Some(traceback) = report.traceback.take() {
            if excess + TRUNCATION_TAG.len() < traceback.len() {
                report.traceback = Some(shorten(&traceback, excess));
            }
        } else if report.message.len() > TRUNCATION_TAG.len() {
            report.message = shorten(&report.message, excess);
        } else {
            break;
        }

        json = serde_json::to_string(&report)?;
    }

    Ok(json)
}

/// Drop at least `excess` bytes from the end of `s`, marking the cut.
fn shorten(s: &str, excess: usize) -> String {
    let mut keep = s.len().saturating_sub(excess + TRUNCATION_TAG.len());
    while !s.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}{}", &s[..keep], TRUNCATION_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_success() {
        let mut progress = ProgressSnapshot::new("rescored", 2);
        progress.record(crate::UpdateOutcome::Succeeded);
        let json = encode_success(&progress).unwrap();

        let decoded = TaskOutput::decode(&json).unwrap();
        assert_eq!(decoded, TaskOutput::Progress(progress));
    }

    #[test]
    fn test_encode_success_rejects_oversized_output() {
        let progress = ProgressSnapshot::new("x".repeat(MAX_TASK_OUTPUT_LEN), 0);
        let err = encode_success(&progress).unwrap_err();
        assert!(matches!(err, CoreError::OutputTooLong { .. }));
    }

    #[test]
    fn test_encode_failure_fits_untouched() {
        let report = FailureReport::new("StudentNotFound", "no student").with_traceback("trace", 100);
        let json = encode_failure(&report).unwrap();
        assert_eq!(TaskOutput::decode(&json).unwrap(), TaskOutput::Failure(report));
    }

    #[test]
    fn test_encode_failure_shortens_traceback_first() {
        let report = FailureReport::new("Fatal", "boom").with_traceback("t".repeat(2000), 5000);
        let json = encode_failure(&report).unwrap();
        assert!(json.len() <= MAX_TASK_OUTPUT_LEN);

        let TaskOutput::Failure(stored) = TaskOutput::decode(&json).unwrap() else {
            panic!("expected failure output");
        };
        assert_eq!(stored.message, "boom");
        assert!(stored.traceback.unwrap().ends_with("..."));
    }

    #[test]
    fn test_encode_failure_shortens_message_when_needed() {
        let report = FailureReport::new("Fatal", "m".repeat(3000)).with_traceback("short", 100);
        let json = encode_failure(&report).unwrap();
        assert!(json.len() <= MAX_TASK_OUTPUT_LEN);

        let TaskOutput::Failure(stored) = TaskOutput::decode(&json).unwrap() else {
            panic!("expected failure output");
        };
        assert!(stored.traceback.is_none());
        assert!(stored.message.ends_with("..."));
    }

    #[test]
    fn test_with_traceback_bounds_length() {
        let report = FailureReport::new("Fatal", "boom").with_traceback("é".repeat(100), 51);
        let traceback = report.traceback.unwrap();
        assert!(traceback.len() <= 51);
        assert!(traceback.ends_with("..."));
    }

    #[test]
    fn test_with_traceback_drops_when_bound_is_tiny() {
        for max_len in 0..=TRUNCATION_TAG.len() {
            let report = FailureReport::new("Fatal", "boom").with_traceback("traceback", max_len);
            assert_eq!(report.traceback, None);
        }
        let report = FailureReport::new("Fatal", "boom").with_traceback("ab", 2);
        assert_eq!(report.traceback.as_deref(), Some("ab"));
    }
}
