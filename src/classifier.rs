//! Classifier adapter
//!
//! The scan depends on a classifier only through [`WindowClassifier`]: a
//! fixed-length sample vector in, one probability out. Model runtimes,
//! weights, and serialization formats stay on the other side of this trait.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::ClassifierError;

/// Identity of a classifier, recorded in every run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClassifierInfo {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            version: "unversioned".to_string(),
        }
    }
}

/// Trait for window classifiers
///
/// Implementations must be callable from several scoring threads at once.
pub trait WindowClassifier: Send + Sync {
    /// Score one window, returning a probability in [0, 1]
    fn predict(&self, window: &[f32]) -> Result<f64, ClassifierError>;

    /// Score several windows in one call
    ///
    /// Must return exactly one result per input window, in input order.
    fn predict_batch(&self, windows: &[&[f32]]) -> Vec<Result<f64, ClassifierError>> {
        windows.iter().map(|w| self.predict(w)).collect()
    }

    /// Fixed input length, if the classifier has one
    fn input_len(&self) -> Option<usize> {
        None
    }

    fn info(&self) -> ClassifierInfo {
        ClassifierInfo::default()
    }
}

/// Classifier backed by a closure
pub struct FnClassifier<F> {
    predict: F,
    input_len: Option<usize>,
    info: ClassifierInfo,
}

impl<F> FnClassifier<F>
where
    F: Fn(&[f32]) -> Result<f64, ClassifierError> + Send + Sync,
{
    pub fn new(predict: F) -> Self {
        Self {
            predict,
            input_len: None,
            info: ClassifierInfo::default(),
        }
    }

    pub fn with_input_len(mut self, input_len: usize) -> Self {
        self.input_len = Some(input_len);
        self
    }

    pub fn with_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ClassifierInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }
}

impl<F> WindowClassifier for FnClassifier<F>
where
    F: Fn(&[f32]) -> Result<f64, ClassifierError> + Send + Sync,
{
    fn predict(&self, window: &[f32]) -> Result<f64, ClassifierError> {
        if let Some(expected) = self.input_len {
            if window.len() != expected {
                return Err(ClassifierError::InputLength {
                    expected,
                    actual: window.len(),
                });
            }
        }
        (self.predict)(window)
    }

    fn input_len(&self) -> Option<usize> {
        self.input_len
    }

    fn info(&self) -> ClassifierInfo {
        self.info.clone()
    }
}

/// Reject probabilities that are not finite or fall outside [0, 1]
pub fn check_probability(probability: f64) -> Result<f64, ClassifierError> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(ClassifierError::InvalidOutput(probability))
    }
}

/// Score a batch of windows, validating every output and the per-call budget
///
/// Always returns one result per window.
pub(crate) fn score_batch(
    classifier: &dyn WindowClassifier,
    windows: &[&[f32]],
    call_budget: Option<Duration>,
) -> Vec<Result<f64, ClassifierError>> {
    let started = Instant::now();
    let mut results = classifier.predict_batch(windows);
    let elapsed = started.elapsed();

    if results.len() != windows.len() {
        let message = format!(
            "batch call returned {} results for {} windows",
            results.len(),
            windows.len()
        );
        return vec![Err(ClassifierError::Runtime(message)); windows.len()];
    }

    if let Some(budget) = call_budget {
        if elapsed > budget {
            let err = ClassifierError::CallBudgetExceeded {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            };
            return vec![Err(err); windows.len()];
        }
    }

    for result in results.iter_mut() {
        if let Ok(probability) = *result {
            *result = check_probability(probability);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_classifier(
    ) -> FnClassifier<impl Fn(&[f32]) -> Result<f64, ClassifierError> + Send + Sync> {
        FnClassifier::new(|w: &[f32]| {
            let peak = w.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            Ok(peak.min(1.0) as f64)
        })
    }

    #[test]
    fn test_fn_classifier_scores_window() {
        let classifier = peak_classifier();
        assert_eq!(classifier.predict(&[0.1, -0.7, 0.2]).unwrap(), 0.7f32 as f64);
    }

    #[test]
    fn test_fn_classifier_enforces_input_len() {
        let classifier = peak_classifier().with_input_len(4);
        assert_eq!(
            classifier.predict(&[0.0; 3]),
            Err(ClassifierError::InputLength {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(classifier.input_len(), Some(4));
    }

    #[test]
    fn test_info_is_reported() {
        let classifier = peak_classifier().with_info("peak", "1.2.0");
        let info = classifier.info();
        assert_eq!(info.name, "peak");
        assert_eq!(info.version, "1.2.0");
        assert_eq!(peak_classifier().info(), ClassifierInfo::default());
    }

    #[test]
    fn test_default_batch_preserves_order() {
        let classifier = peak_classifier();
        let a = [0.2f32];
        let b = [0.9f32];
        let results = classifier.predict_batch(&[&a, &b, &a]);
        let scores: Vec<f64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(scores, vec![0.2f32 as f64, 0.9f32 as f64, 0.2f32 as f64]);
    }

    #[test]
    fn test_score_batch_rejects_invalid_probabilities() {
        let classifier = FnClassifier::new(|w: &[f32]| Ok(w[0] as f64));
        let windows: [&[f32]; 4] = [&[0.5], &[1.5], &[f32::NAN], &[-0.1]];
        let results = score_batch(&classifier, &windows, None);

        assert_eq!(results[0], Ok(0.5));
        assert!(matches!(results[1], Err(ClassifierError::InvalidOutput(_))));
        assert!(matches!(results[2], Err(ClassifierError::InvalidOutput(_))));
        assert!(matches!(results[3], Err(ClassifierError::InvalidOutput(_))));
    }

    #[test]
    fn test_score_batch_enforces_call_budget() {
        let classifier = FnClassifier::new(|_: &[f32]| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(0.5)
        });
        let windows: [&[f32]; 2] = [&[0.0], &[0.0]];
        let results = score_batch(&classifier, &windows, Some(Duration::from_millis(1)));

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(ClassifierError::CallBudgetExceeded { .. }))));
    }

    struct ShortBatch;

    impl WindowClassifier for ShortBatch {
        fn predict(&self, _window: &[f32]) -> Result<f64, ClassifierError> {
            Ok(0.5)
        }

        fn predict_batch(&self, _windows: &[&[f32]]) -> Vec<Result<f64, ClassifierError>> {
            vec![Ok(0.5)]
        }
    }

    #[test]
    fn test_score_batch_rejects_wrong_result_count() {
        let windows: [&[f32]; 3] = [&[0.0], &[0.0], &[0.0]];
        let results = score_batch(&ShortBatch, &windows, None);
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(ClassifierError::Runtime(_)))));
    }
}
