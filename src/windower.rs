//! Window generation
//!
//! A [`WindowPlan`] describes every window of a scan without materializing
//! them. Iteration is lazy and restartable: each call to [`WindowPlan::iter`]
//! starts again from the first window, and memory use does not depend on how
//! densely the windows overlap.
//!
//! Full-step windows start at `0, step, 2*step, ...` and number
//! `floor((signal_length - window_size) / step) + 1`. When the last of them
//! does not reach the end of the signal, [`TrailingPolicy`] decides whether
//! the remainder is dropped or covered by one extra window anchored at
//! `signal_length - window_size`.

use crate::config::{step_for, validate_window, TrailingPolicy};
use crate::error::ScanError;
use crate::types::Window;

/// Restartable description of the windows over one signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPlan {
    signal_length: usize,
    window_size: usize,
    step: usize,
    full_windows: usize,
    anchored: bool,
    sample_rate_hz: f64,
}

impl WindowPlan {
    /// Plan the windows for a signal of `signal_length` samples
    pub fn new(
        signal_length: usize,
        window_size: usize,
        overlap: f64,
        trailing: TrailingPolicy,
        sample_rate_hz: f64,
    ) -> Result<Self, ScanError> {
        validate_window(signal_length, window_size, overlap)?;
        if !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
            return Err(ScanError::InvalidSignal(format!(
                "sample rate must be positive and finite (got {})",
                sample_rate_hz
            )));
        }

        let step = step_for(window_size, overlap);
        let span = signal_length - window_size;
        let full_windows = span / step + 1;
        let anchored = trailing == TrailingPolicy::Anchor && span % step != 0;

        Ok(Self {
            signal_length,
            window_size,
            step,
            full_windows,
            anchored,
            sample_rate_hz,
        })
    }

    /// Total number of windows, including an anchored trailing window
    pub fn len(&self) -> usize {
        self.full_windows + usize::from(self.anchored)
    }

    /// Always false: a valid plan has at least one window
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn signal_length(&self) -> usize {
        self.signal_length
    }

    /// Number of windows on the regular step grid
    pub fn full_window_count(&self) -> usize {
        self.full_windows
    }

    /// True when a final window was added to reach the end of the signal
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// One past the last sample any window covers
    pub fn covered_end(&self) -> usize {
        if self.anchored {
            self.signal_length
        } else {
            (self.full_windows - 1) * self.step + self.window_size
        }
    }

    /// Samples at the end of the signal that no window covers
    pub fn uncovered_tail(&self) -> usize {
        self.signal_length - self.covered_end()
    }

    /// Window at ordinal position `index`
    pub fn window(&self, index: usize) -> Option<Window> {
        let start_index = if index < self.full_windows {
            index * self.step
        } else if self.anchored && index == self.full_windows {
            self.signal_length - self.window_size
        } else {
            return None;
        };
        let end_index = start_index + self.window_size;

        Some(Window {
            index,
            start_index,
            end_index,
            start_time_s: start_index as f64 / self.sample_rate_hz,
            end_time_s: end_index as f64 / self.sample_rate_hz,
        })
    }

    /// Lazily iterate every window in ascending start order
    pub fn iter(&self) -> Windows {
        Windows {
            plan: *self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a WindowPlan {
    type Item = Window;
    type IntoIter = Windows;

    fn into_iter(self) -> Windows {
        self.iter()
    }
}

/// Iterator over the windows of a [`WindowPlan`]
#[derive(Debug, Clone)]
pub struct Windows {
    plan: WindowPlan,
    next: usize,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let window = self.plan.window(self.next)?;
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}

/// Windows over a signal of `signal_length` samples with the default
/// [`TrailingPolicy`], timed in samples (a sample rate of 1)
pub fn generate_windows(
    signal_length: usize,
    window_size: usize,
    overlap: f64,
) -> Result<Windows, ScanError> {
    Ok(WindowPlan::new(
        signal_length,
        window_size,
        overlap,
        TrailingPolicy::default(),
        1.0,
    )?
    .iter())
}
