//! Opt-in post-filters over aggregated events
//!
//! Both filters take and return events in ascending order and preserve the
//! non-overlap invariant. The scan applies the gap re-merge before the
//! duration filter, so short fragments that re-merge into a longer event
//! survive.

use crate::types::Event;

/// Re-merge neighbouring events separated by fewer than `min_gap` samples
///
/// Returns the merged events and how many merges happened.
pub fn merge_close_events(events: Vec<Event>, min_gap: usize) -> (Vec<Event>, usize) {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());
    let mut merges = 0;

    for event in events {
        match merged.last_mut() {
            Some(last) if event.start_index.saturating_sub(last.end_index) < min_gap => {
                if event.end_index > last.end_index {
                    last.end_index = event.end_index;
                    last.end_time_s = event.end_time_s;
                }
                if event.confidence > last.confidence {
                    last.confidence = event.confidence;
                    last.peak_time_s = event.peak_time_s;
                }
                last.supporting_detection_count += event.supporting_detection_count;
                merges += 1;
            }
            _ => merged.push(event),
        }
    }

    (merged, merges)
}

/// Drop events shorter than `min_duration` samples
///
/// Returns the kept events and how many were dropped.
pub fn drop_short_events(events: Vec<Event>, min_duration: usize) -> (Vec<Event>, usize) {
    let before = events.len();
    let kept: Vec<Event> = events
        .into_iter()
        .filter(|e| e.duration_samples() >= min_duration)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
