//! Run summary
//!
//! Counts, timings, and the parameters a scan actually ran with. The summary
//! is serialized next to the events so downstream verification can reproduce
//! a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::classifier::ClassifierInfo;
use crate::config::ScanConfig;
use crate::types::StopReason;

/// Parameters a run used, including values derived from the config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    #[serde(flatten)]
    pub config: ScanConfig,
    pub step: usize,
    pub sample_rate_hz: f64,
    pub classifier: ClassifierInfo,
}

/// Summary of a single scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub engine_name: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub num_windows_planned: usize,
    pub num_windows_scanned: usize,
    pub num_skipped_windows: usize,
    pub num_raw_detections: usize,
    pub num_events: usize,
    pub num_events_merged_by_gap: usize,
    pub num_events_dropped_short: usize,
    pub elapsed_time_s: f64,
    /// True when the scan stopped before every planned window was scored
    pub incomplete: bool,
    pub stop_reason: Option<StopReason>,
    /// True when every planned window was a detection
    pub saturated: bool,
    pub parameters_used: ScanParameters,
}

/// Collects counters while a scan runs and emits the final [`RunSummary`]
#[derive(Debug)]
pub struct SummaryEmitter {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    parameters: ScanParameters,
    windows_planned: usize,
    windows_scanned: usize,
    skipped_windows: usize,
    raw_detections: usize,
    merged_by_gap: usize,
    dropped_short: usize,
    stop_reason: Option<StopReason>,
}

impl SummaryEmitter {
    pub fn new(parameters: ScanParameters, windows_planned: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            clock: Instant::now(),
            parameters,
            windows_planned,
            windows_scanned: 0,
            skipped_windows: 0,
            raw_detections: 0,
            merged_by_gap: 0,
            dropped_short: 0,
            stop_reason: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Count one scored window
    pub fn record_window(&mut self, detection: bool) {
        self.windows_scanned += 1;
        if detection {
            self.raw_detections += 1;
        }
    }

    /// Count one window the classifier failed on under the skip policy
    pub fn record_skip(&mut self) {
        self.windows_scanned += 1;
        self.skipped_windows += 1;
    }

    pub fn record_filters(&mut self, merged_by_gap: usize, dropped_short: usize) {
        self.merged_by_gap = merged_by_gap;
        self.dropped_short = dropped_short;
    }

    pub fn record_stop(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }

    pub fn windows_scanned(&self) -> usize {
        self.windows_scanned
    }

    pub fn finish(self, num_events: usize) -> RunSummary {
        let incomplete =
            self.stop_reason.is_some() || self.windows_scanned < self.windows_planned;
        let saturated = !incomplete
            && self.windows_planned > 0
            && self.skipped_windows == 0
            && self.raw_detections == self.windows_planned;

        RunSummary {
            run_id: self.run_id.to_string(),
            engine_name: crate::ENGINE_NAME.to_string(),
            engine_version: crate::ENGINE_VERSION.to_string(),
            started_at: self.started_at,
            num_windows_planned: self.windows_planned,
            num_windows_scanned: self.windows_scanned,
            num_skipped_windows: self.skipped_windows,
            num_raw_detections: self.raw_detections,
            num_events,
            num_events_merged_by_gap: self.merged_by_gap,
            num_events_dropped_short: self.dropped_short,
            elapsed_time_s: self.clock.elapsed().as_secs_f64(),
            incomplete,
            stop_reason: self.stop_reason,
            saturated,
            parameters_used: self.parameters,
        }
    }
}

impl RunSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
