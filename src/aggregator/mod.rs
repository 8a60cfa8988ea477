//! Event aggregation
//!
//! Folds a time-ordered stream of detections into non-overlapping events in
//! a single forward sweep. At high window overlap one physical event fires
//! many consecutive windows; the sweep keeps one open event and extends it
//! while each new detection starts no later than `open.max_end +
//! gap_tolerance`. Anything further away closes the open event.
//!
//! Confidence is the maximum contributing probability, so weaker flanking
//! windows never dilute a strong central detection.

pub mod filters;

pub use filters::{drop_short_events, merge_close_events};

use crate::error::ScanError;
use crate::types::{Detection, Event};

/// The event currently being extended
#[derive(Debug, Clone, Copy)]
struct OpenEvent {
    min_start: usize,
    max_end: usize,
    confidence: f64,
    peak_start: usize,
    count: usize,
}

impl OpenEvent {
    fn from_detection(detection: &Detection) -> Self {
        Self {
            min_start: detection.window.start_index,
            max_end: detection.window.end_index,
            confidence: detection.probability,
            peak_start: detection.window.start_index,
            count: 1,
        }
    }

    fn absorb(&mut self, detection: &Detection) {
        self.max_end = self.max_end.max(detection.window.end_index);
        if detection.probability > self.confidence {
            self.confidence = detection.probability;
            self.peak_start = detection.window.start_index;
        }
        self.count += 1;
    }

    fn close(self, sample_rate_hz: f64) -> Event {
        Event {
            start_time_s: self.min_start as f64 / sample_rate_hz,
            end_time_s: self.max_end as f64 / sample_rate_hz,
            confidence: self.confidence,
            peak_time_s: self.peak_start as f64 / sample_rate_hz,
            start_index: self.min_start,
            end_index: self.max_end,
            supporting_detection_count: self.count,
        }
    }
}

/// Single-writer accumulator for one signal
#[derive(Debug)]
pub struct EventAggregator {
    gap_tolerance: usize,
    sample_rate_hz: f64,
    open: Option<OpenEvent>,
    last_start: Option<usize>,
    events: Vec<Event>,
    detections_seen: usize,
}

impl EventAggregator {
    pub fn new(gap_tolerance: usize, sample_rate_hz: f64) -> Self {
        Self {
            gap_tolerance,
            sample_rate_hz,
            open: None,
            last_start: None,
            events: Vec::new(),
            detections_seen: 0,
        }
    }

    /// Feed the next detection
    ///
    /// Detections must arrive in ascending `start_index` order. Returns the
    /// event closed by this detection, if any.
    pub fn push(&mut self, detection: &Detection) -> Result<Option<&Event>, ScanError> {
        let start = detection.window.start_index;
        if let Some(previous_start) = self.last_start {
            if start < previous_start {
                return Err(ScanError::UnorderedDetection {
                    start_index: start,
                    previous_start,
                });
            }
        }
        self.last_start = Some(start);
        self.detections_seen += 1;

        match self.open {
            None => {
                self.open = Some(OpenEvent::from_detection(detection));
                Ok(None)
            }
            Some(ref mut open) if start <= open.max_end.saturating_add(self.gap_tolerance) => {
                open.absorb(detection);
                Ok(None)
            }
            Some(closed) => {
                self.events.push(closed.close(self.sample_rate_hz));
                self.open = Some(OpenEvent::from_detection(detection));
                Ok(self.events.last())
            }
        }
    }

    /// True while an event is being extended
    pub fn has_open_event(&self) -> bool {
        self.open.is_some()
    }

    /// Events closed so far, excluding the open one
    pub fn closed_events(&self) -> &[Event] {
        &self.events
    }

    pub fn detections_seen(&self) -> usize {
        self.detections_seen
    }

    /// Close the open event, if any, and return every event in ascending order
    pub fn finish(mut self) -> Vec<Event> {
        if let Some(open) = self.open.take() {
            self.events.push(open.close(self.sample_rate_hz));
        }
        self.events
    }
}

/// Aggregate an already ordered detection stream in one call
pub fn aggregate_detections<'a, I>(
    detections: I,
    gap_tolerance: usize,
    sample_rate_hz: f64,
) -> Result<Vec<Event>, ScanError>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut aggregator = EventAggregator::new(gap_tolerance, sample_rate_hz);
    for detection in detections {
        aggregator.push(detection)?;
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Window;
    use pretty_assertions::assert_eq;

    fn detection(start: usize, end: usize, probability: f64) -> Detection {
        Detection {
            window: Window {
                index: start,
                start_index: start,
                end_index: end,
                start_time_s: start as f64,
                end_time_s: end as f64,
            },
            probability,
        }
    }

    fn assert_disjoint_and_sorted(events: &[Event]) {
        for event in events {
            assert!(event.start_time_s < event.end_time_s);
        }
        for pair in events.windows(2) {
            assert!(pair[0].end_index <= pair[1].start_index);
            assert!(pair[0].start_time_s < pair[1].start_time_s);
        }
    }

    #[test]
    fn test_overlapping_detections_merge() {
        let events = aggregate_detections(
            &[detection(0, 540, 0.6), detection(27, 567, 0.9)],
            0,
            1.0,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_index, 0);
        assert_eq!(events[0].end_index, 567);
        assert_eq!(events[0].confidence, 0.9);
        assert_eq!(events[0].peak_time_s, 27.0);
        assert_eq!(events[0].supporting_detection_count, 2);
    }

    #[test]
    fn test_confidence_is_max_not_mean() {
        let events = aggregate_detections(
            &[
                detection(0, 100, 0.55),
                detection(10, 110, 0.99),
                detection(20, 120, 0.55),
                detection(30, 130, 0.55),
            ],
            0,
            1.0,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].confidence, 0.99);
    }

    #[test]
    fn test_peak_keeps_first_maximum() {
        let events = aggregate_detections(
            &[detection(0, 100, 0.8), detection(10, 110, 0.8)],
            0,
            1.0,
        )
        .unwrap();
        assert_eq!(events[0].peak_time_s, 0.0);
    }

    #[test]
    fn test_adjacent_detections_merge_with_zero_tolerance() {
        let events =
            aggregate_detections(&[detection(0, 100, 0.7), detection(100, 200, 0.6)], 0, 1.0)
                .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end_index, 200);
    }

    #[test]
    fn test_gap_splits_events() {
        let detections = [detection(0, 100, 0.7), detection(101, 201, 0.6)];

        let events = aggregate_detections(&detections, 0, 1.0).unwrap();
        assert_eq!(events.len(), 2);
        assert_disjoint_and_sorted(&events);

        let events = aggregate_detections(&detections, 1, 1.0).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_contained_detection_does_not_shrink_event() {
        let events =
            aggregate_detections(&[detection(0, 500, 0.7), detection(10, 100, 0.6)], 0, 1.0)
                .unwrap();
        assert_eq!(events[0].end_index, 500);
    }

    #[test]
    fn test_no_detections_yield_no_events() {
        let none: [Detection; 0] = [];
        let events = aggregate_detections(&none, 0, 1.0).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_single_detection_is_its_own_event() {
        let events = aggregate_detections(&[detection(270, 810, 0.51)], 0, 10_000.0).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_index, 270);
        assert_eq!(events[0].end_index, 810);
        assert!((events[0].start_time_s - 0.027).abs() < 1e-12);
        assert!((events[0].end_time_s - 0.081).abs() < 1e-12);
        assert_eq!(events[0].supporting_detection_count, 1);
    }

    #[test]
    fn test_push_reports_closed_event() {
        let mut aggregator = EventAggregator::new(0, 1.0);
        assert!(aggregator.push(&detection(0, 10, 0.9)).unwrap().is_none());
        assert!(aggregator.push(&detection(5, 15, 0.9)).unwrap().is_none());

        let closed = aggregator.push(&detection(40, 50, 0.7)).unwrap().cloned();
        assert_eq!(closed.map(|e| (e.start_index, e.end_index)), Some((0, 15)));
        assert!(aggregator.has_open_event());
        assert_eq!(aggregator.closed_events().len(), 1);
        assert_eq!(aggregator.detections_seen(), 3);

        let events = aggregator.finish();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].start_index, 40);
    }

    #[test]
    fn test_unordered_detection_is_rejected() {
        let mut aggregator = EventAggregator::new(0, 1.0);
        aggregator.push(&detection(50, 100, 0.9)).unwrap();
        let err = aggregator.push(&detection(20, 70, 0.9)).unwrap_err();
        assert!(matches!(
            err,
            ScanError::UnorderedDetection {
                start_index: 20,
                previous_start: 50
            }
        ));
    }

    #[test]
    fn test_equal_starts_are_accepted() {
        let events =
            aggregate_detections(&[detection(10, 20, 0.6), detection(10, 20, 0.8)], 0, 1.0)
                .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].confidence, 0.8);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let detections: Vec<Detection> = (0..200)
            .filter(|i| i % 7 != 3)
            .map(|i| detection(i * 27, i * 27 + 30, 0.5 + (i % 5) as f64 / 10.0))
            .collect();

        let first = aggregate_detections(&detections, 0, 10_000.0).unwrap();
        let second = aggregate_detections(&detections, 0, 10_000.0).unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_disjoint_and_sorted(&first);
    }

    #[test]
    fn test_events_never_overlap() {
        // Irregular lengths and gaps, including contained and touching spans
        let spans = [
            (0, 40),
            (5, 20),
            (30, 90),
            (91, 95),
            (95, 140),
            (200, 260),
            (210, 220),
            (262, 300),
            (400, 401),
        ];
        let detections: Vec<Detection> = spans
            .iter()
            .map(|&(s, e)| detection(s, e, 0.75))
            .collect();

        for tolerance in [0, 1, 2, 50, 500] {
            let events = aggregate_detections(&detections, tolerance, 1.0).unwrap();
            assert_disjoint_and_sorted(&events);
            let total: usize = events.iter().map(|e| e.supporting_detection_count).sum();
            assert_eq!(total, spans.len());
        }
    }
}
