//! Pipeline orchestration
//!
//! This module provides the public API for Ephys Scan.
//! It runs the full pipeline from a signal and a classifier to events and a
//! run summary, without touching the filesystem.

use std::time::Instant;

use crate::aggregator::{drop_short_events, merge_close_events, EventAggregator};
use crate::cancel::CancelToken;
use crate::classifier::WindowClassifier;
use crate::config::{ClassifierFailurePolicy, ScanConfig};
use crate::error::ScanError;
use crate::scorer::{score_windows, ScanBudget};
use crate::summary::{ScanParameters, SummaryEmitter};
use crate::threshold::Thresholder;
use crate::types::{Detection, ScanOutput, Signal, StopReason};
use crate::windower::WindowPlan;

/// Scan a signal for events (stateless, one-shot).
///
/// # Arguments
/// * `signal` - Validated amplitude trace with its sample rate
/// * `classifier` - Window classifier returning probabilities in [0, 1]
/// * `config` - Scan parameters, validated before any window is scored
///
/// # Returns
/// Events in ascending time order plus the run summary. A run that hits
/// `max_runtime_ms` returns the events found so far with
/// `summary.incomplete == true`.
///
/// # Example
/// ```ignore
/// let output = scan_signal(&signal, &classifier, &ScanConfig::new(540, 0.95, 0.5))?;
/// ```
pub fn scan_signal(
    signal: &Signal,
    classifier: &dyn WindowClassifier,
    config: &ScanConfig,
) -> Result<ScanOutput, ScanError> {
    run_scan(signal, classifier, config, None)
}

/// Reusable scanner with a fixed configuration and optional cancellation.
pub struct EventScanner {
    config: ScanConfig,
    cancel: Option<CancelToken>,
}

impl Default for EventScanner {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

impl EventScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Attach a token that can stop a running scan from another thread
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan one signal
    pub fn scan(
        &self,
        signal: &Signal,
        classifier: &dyn WindowClassifier,
    ) -> Result<ScanOutput, ScanError> {
        run_scan(signal, classifier, &self.config, self.cancel.as_ref())
    }
}

/// Run every stage for one signal.
///
/// Pipeline stages:
/// 1. Validation - config and classifier input length against the signal
/// 2. WindowPlan - lazy, ordered windows
/// 3. Scoring - classifier calls, possibly parallel, released in window order
/// 4. Thresholder + EventAggregator - single-threaded fold into events
/// 5. Post-filters - gap re-merge, then minimum duration (both opt-in)
/// 6. SummaryEmitter - counts, timings, parameters
fn run_scan(
    signal: &Signal,
    classifier: &dyn WindowClassifier,
    config: &ScanConfig,
    cancel: Option<&CancelToken>,
) -> Result<ScanOutput, ScanError> {
    // Stage 1: Reject caller mistakes before any scoring
    config.validate(signal.len())?;
    if let Some(input_len) = classifier.input_len() {
        if input_len != config.window_size {
            return Err(ScanError::config(
                "window_size",
                format!(
                    "{} does not match classifier input length {}",
                    config.window_size, input_len
                ),
            ));
        }
    }
    let thresholder = Thresholder::new(config.threshold)?;

    // Stage 2: Plan windows
    let plan = WindowPlan::new(
        signal.len(),
        config.window_size,
        config.overlap,
        config.trailing_policy,
        signal.sample_rate_hz(),
    )?;

    let parameters = ScanParameters {
        config: config.clone(),
        step: plan.step(),
        sample_rate_hz: signal.sample_rate_hz(),
        classifier: classifier.info(),
    };
    let mut summary = SummaryEmitter::new(parameters, plan.len());

    tracing::debug!(
        run_id = %summary.run_id(),
        signal_len = signal.len(),
        windows = plan.len(),
        step = plan.step(),
        anchored = plan.is_anchored(),
        uncovered_tail = plan.uncovered_tail(),
        workers = config.workers,
        "planned scan"
    );

    let budget = ScanBudget {
        cancel,
        deadline: config.max_runtime().map(|limit| Instant::now() + limit),
        call_budget: config.call_budget(),
    };

    // Stages 3-4: Score, threshold, and aggregate in window order
    let mut aggregator = EventAggregator::new(config.gap_tolerance, signal.sample_rate_hz());
    let stop = score_windows(
        signal,
        &plan,
        classifier,
        config.workers,
        config.batch_size,
        &budget,
        |window, result| match result {
            Ok(probability) => {
                let detected = thresholder.is_detection(probability);
                summary.record_window(detected);
                if detected {
                    let detection = Detection {
                        window,
                        probability,
                    };
                    aggregator.push(&detection)?;
                }
                Ok(())
            }
            Err(source) => match config.failure_policy {
                ClassifierFailurePolicy::Skip => {
                    tracing::warn!(
                        window = window.index,
                        start = window.start_index,
                        end = window.end_index,
                        error = %source,
                        "skipping window after classifier error"
                    );
                    summary.record_skip();
                    Ok(())
                }
                ClassifierFailurePolicy::Abort => {
                    tracing::error!(
                        window = window.index,
                        start = window.start_index,
                        end = window.end_index,
                        error = %source,
                        "classifier error, aborting scan"
                    );
                    Err(ScanError::Classifier {
                        window_index: window.index,
                        start_index: window.start_index,
                        end_index: window.end_index,
                        source,
                    })
                }
            },
        },
    )?;

    if let Some(reason) = stop {
        match reason {
            StopReason::Timeout => tracing::warn!(
                scanned = summary.windows_scanned(),
                planned = plan.len(),
                "scan exceeded its runtime budget, returning partial events"
            ),
            StopReason::Cancelled => tracing::warn!(
                scanned = summary.windows_scanned(),
                planned = plan.len(),
                "scan cancelled, returning partial events"
            ),
        }
        summary.record_stop(reason);
    }

    // The still-open event is closed over the scanned prefix
    let events = aggregator.finish();

    // Stage 5: Opt-in post-filters
    let (events, merged_by_gap) = match config.min_event_gap {
        Some(min_gap) => merge_close_events(events, min_gap),
        None => (events, 0),
    };
    let (events, dropped_short) = match config.min_event_duration {
        Some(min_duration) => drop_short_events(events, min_duration),
        None => (events, 0),
    };
    summary.record_filters(merged_by_gap, dropped_short);

    // Stage 6: Summary
    let summary = summary.finish(events.len());
    if summary.saturated {
        tracing::warn!(
            windows = summary.num_windows_planned,
            "every window was a detection; scan is saturated"
        );
    }
    tracing::info!(
        run_id = %summary.run_id,
        windows = summary.num_windows_scanned,
        detections = summary.num_raw_detections,
        skipped = summary.num_skipped_windows,
        events = summary.num_events,
        incomplete = summary.incomplete,
        elapsed_s = summary.elapsed_time_s,
        "scan finished"
    );

    Ok(ScanOutput { events, summary })
}
