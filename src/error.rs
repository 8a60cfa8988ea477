//! Error types for Ephys Scan

use thiserror::Error;

/// Errors raised by a [`WindowClassifier`](crate::classifier::WindowClassifier)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("Input length mismatch: expected {expected} samples, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("Classifier returned an invalid probability: {0}")]
    InvalidOutput(f64),

    #[error("Classifier call took {elapsed_ms} ms, budget is {budget_ms} ms")]
    CallBudgetExceeded { elapsed_ms: u64, budget_ms: u64 },

    #[error("Classifier runtime error: {0}")]
    Runtime(String),
}

/// Errors that can occur during a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error(
        "Classifier failed on window {window_index} (samples {start_index}..{end_index}): {source}"
    )]
    Classifier {
        window_index: usize,
        start_index: usize,
        end_index: usize,
        #[source]
        source: ClassifierError,
    },

    #[error("Detection at sample {start_index} arrived after detection at sample {previous_start}")]
    UnorderedDetection {
        start_index: usize,
        previous_start: usize,
    },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ScanError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors caused by bad caller input (configuration or signal).
    ///
    /// These are never recovered from inside a run.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidConfig { .. } | ScanError::InvalidSignal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_error_carries_window_context() {
        let err = ScanError::Classifier {
            window_index: 7,
            start_index: 189,
            end_index: 729,
            source: ClassifierError::Runtime("session closed".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("window 7"));
        assert!(message.contains("189..729"));
        assert!(message.contains("session closed"));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_caller_errors() {
        assert!(ScanError::config("overlap", "must be below 1").is_caller_error());
        assert!(ScanError::InvalidSignal("empty".to_string()).is_caller_error());
        assert!(!ScanError::UnorderedDetection {
            start_index: 0,
            previous_start: 27
        }
        .is_caller_error());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ScanError = parse.unwrap_err().into();
        assert!(matches!(err, ScanError::JsonError(_)));
    }
}
