//! Scan configuration
//!
//! A single serde-friendly struct carries every tunable of a run. Missing JSON
//! fields fall back to [`ScanConfig::default`], so partial configs are valid
//! input. Validation happens once, before any window is produced.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ScanError;

/// Default window length in samples
pub const DEFAULT_WINDOW_SIZE: usize = 540;

/// Default fraction of a window shared with the next one
pub const DEFAULT_OVERLAP: f64 = 0.95;

/// Default detection threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// What to do with the samples after the last full-step window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Leave an incomplete trailing span unscanned
    #[default]
    Drop,
    /// Add one final window ending exactly at the last sample
    Anchor,
}

/// How a classifier fault on a single window is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierFailurePolicy {
    /// Abort the whole run with the first classifier error
    #[default]
    Abort,
    /// Record the window as skipped and keep scanning
    Skip,
}

/// Configuration for a single scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Window length in samples
    pub window_size: usize,
    /// Fraction of a window shared with the next window, in [0, 1)
    pub overlap: f64,
    /// Minimum probability for a window to count as a detection, in (0, 1]
    pub threshold: f64,
    /// Maximum sample gap between two detections that still merge
    pub gap_tolerance: usize,
    /// Drop events shorter than this many samples
    pub min_event_duration: Option<usize>,
    /// Re-merge events separated by fewer than this many samples
    pub min_event_gap: Option<usize>,
    /// Wall-clock budget for the whole run (milliseconds)
    pub max_runtime_ms: Option<u64>,
    /// Wall-clock budget for one classifier call (milliseconds)
    ///
    /// Checked after the call returns: an overrun becomes a classifier error
    /// handled by `failure_policy`. This is not a hard timeout, and a call
    /// that never returns still blocks the run.
    pub call_budget_ms: Option<u64>,
    pub trailing_policy: TrailingPolicy,
    pub failure_policy: ClassifierFailurePolicy,
    /// Number of scoring threads; 1 scores on the calling thread
    pub workers: usize,
    /// Windows handed to the classifier per call
    pub batch_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
            threshold: DEFAULT_THRESHOLD,
            gap_tolerance: 0,
            min_event_duration: None,
            min_event_gap: None,
            max_runtime_ms: None,
            call_budget_ms: None,
            trailing_policy: TrailingPolicy::default(),
            failure_policy: ClassifierFailurePolicy::default(),
            workers: 1,
            batch_size: 1,
        }
    }
}

impl ScanConfig {
    /// Create a config with the three required parameters and defaults elsewhere
    pub fn new(window_size: usize, overlap: f64, threshold: f64) -> Self {
        Self {
            window_size,
            overlap,
            threshold,
            ..Default::default()
        }
    }

    pub fn with_gap_tolerance(mut self, samples: usize) -> Self {
        self.gap_tolerance = samples;
        self
    }

    pub fn with_min_event_duration(mut self, samples: usize) -> Self {
        self.min_event_duration = Some(samples);
        self
    }

    pub fn with_min_event_gap(mut self, samples: usize) -> Self {
        self.min_event_gap = Some(samples);
        self
    }

    pub fn with_max_runtime(mut self, budget: Duration) -> Self {
        self.max_runtime_ms = Some(budget.as_millis() as u64);
        self
    }

    pub fn with_call_budget(mut self, budget: Duration) -> Self {
        self.call_budget_ms = Some(budget.as_millis() as u64);
        self
    }

    pub fn with_trailing_policy(mut self, policy: TrailingPolicy) -> Self {
        self.trailing_policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, policy: ClassifierFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Distance in samples between consecutive window starts
    ///
    /// `max(1, round(window_size * (1 - overlap)))`
    pub fn step(&self) -> usize {
        step_for(self.window_size, self.overlap)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime_ms.map(Duration::from_millis)
    }

    pub fn call_budget(&self) -> Option<Duration> {
        self.call_budget_ms.map(Duration::from_millis)
    }

    /// Check every parameter against a signal of `signal_length` samples
    pub fn validate(&self, signal_length: usize) -> Result<(), ScanError> {
        validate_window(signal_length, self.window_size, self.overlap)?;
        crate::threshold::validate_threshold(self.threshold)?;

        if self.workers == 0 {
            return Err(ScanError::config("workers", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ScanError::config("batch_size", "must be at least 1"));
        }
        if self.min_event_duration == Some(0) {
            return Err(ScanError::config(
                "min_event_duration",
                "must be positive when set",
            ));
        }
        if self.call_budget_ms == Some(0) {
            return Err(ScanError::config("call_budget_ms", "must be positive when set"));
        }

        Ok(())
    }

    /// Parse a config from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub(crate) fn step_for(window_size: usize, overlap: f64) -> usize {
    let step = (window_size as f64 * (1.0 - overlap)).round();
    if step.is_finite() && step >= 1.0 {
        step as usize
    } else {
        1
    }
}

pub(crate) fn validate_window(
    signal_length: usize,
    window_size: usize,
    overlap: f64,
) -> Result<(), ScanError> {
    if window_size == 0 {
        return Err(ScanError::config("window_size", "must be positive"));
    }
    if window_size > signal_length {
        return Err(ScanError::config(
            "window_size",
            format!(
                "{} exceeds signal length {}",
                window_size, signal_length
            ),
        ));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(ScanError::config(
            "overlap",
            format!("{} is outside [0, 1)", overlap),
        ));
    }
    Ok(())
}
