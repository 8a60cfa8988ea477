//! Core types for the Ephys Scan pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: the input signal, windows, scored windows, detections, and events.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::summary::RunSummary;

/// Immutable amplitude trace sampled at a fixed rate
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f32>,
    sample_rate_hz: f64,
}

impl Signal {
    /// Wrap a normalized trace, rejecting empty input, a non-positive rate,
    /// or any non-finite sample
    pub fn new(samples: Vec<f32>, sample_rate_hz: f64) -> Result<Self, ScanError> {
        if samples.is_empty() {
            return Err(ScanError::InvalidSignal("signal is empty".to_string()));
        }
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(ScanError::InvalidSignal(format!(
                "sample rate must be positive and finite (got {})",
                sample_rate_hz
            )));
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ScanError::InvalidSignal(format!(
                "non-finite value {} at sample {}",
                samples[index], index
            )));
        }

        Ok(Self {
            samples,
            sample_rate_hz,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: construction rejects empty signals
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn duration_s(&self) -> f64 {
        self.index_to_time(self.samples.len())
    }

    pub fn index_to_time(&self, index: usize) -> f64 {
        index as f64 / self.sample_rate_hz
    }

    /// Samples covered by `window`
    pub fn slice(&self, window: &Window) -> &[f32] {
        &self.samples[window.start_index..window.end_index]
    }
}

/// Fixed-length span of the signal used as one classifier input
///
/// Sample interval is [start_index, end_index), i.e. start inclusive/end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Ordinal position in the scan
    pub index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub start_time_s: f64,
    pub end_time_s: f64,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.end_index == self.start_index
    }
}

/// A window together with its classifier probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub window: Window,
    pub probability: f64,
}

/// A window whose probability met the threshold
pub type Detection = WindowScore;

/// A merged run of overlapping or adjacent detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub start_time_s: f64,
    pub end_time_s: f64,
    /// Maximum probability over the supporting detections
    pub confidence: f64,
    /// Start time of the first window that reached `confidence`
    pub peak_time_s: f64,
    pub start_index: usize,
    /// Exclusive
    pub end_index: usize,
    pub supporting_detection_count: usize,
}

impl Event {
    /// Length in samples
    pub fn duration_samples(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn duration_s(&self) -> f64 {
        self.end_time_s - self.start_time_s
    }
}

/// Why a run stopped before scanning every window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Timeout,
    Cancelled,
}

/// Result of a scan: events in ascending time order plus the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    pub events: Vec<Event>,
    pub summary: RunSummary,
}

impl ScanOutput {
    pub fn to_json(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_rejects_empty() {
        assert!(matches!(
            Signal::new(vec![], 10_000.0),
            Err(ScanError::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_signal_reports_first_non_finite_sample() {
        let err = Signal::new(vec![0.0, 1.0, f32::NAN, f32::INFINITY], 10_000.0).unwrap_err();
        assert!(err.to_string().contains("sample 2"));
    }

    #[test]
    fn test_signal_rejects_bad_sample_rate() {
        assert!(Signal::new(vec![0.0; 4], 0.0).is_err());
        assert!(Signal::new(vec![0.0; 4], -1.0).is_err());
        assert!(Signal::new(vec![0.0; 4], f64::INFINITY).is_err());
    }

    #[test]
    fn test_signal_timing() {
        let signal = Signal::new(vec![0.0; 20_000], 10_000.0).unwrap();
        assert_eq!(signal.len(), 20_000);
        assert!((signal.duration_s() - 2.0).abs() < 1e-12);
        assert!((signal.index_to_time(540) - 0.054).abs() < 1e-12);
    }

    #[test]
    fn test_signal_slice_matches_window() {
        let signal = Signal::new((0..10).map(|i| i as f32).collect(), 1.0).unwrap();
        let window = Window {
            index: 0,
            start_index: 3,
            end_index: 6,
            start_time_s: 3.0,
            end_time_s: 6.0,
        };
        assert_eq!(signal.slice(&window), &[3.0, 4.0, 5.0]);
        assert_eq!(window.len(), 3);
    }
}
