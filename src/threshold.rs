//! Probability thresholding

use crate::error::ScanError;

/// Check that a threshold lies in (0, 1]
pub fn validate_threshold(threshold: f64) -> Result<(), ScanError> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(ScanError::config(
            "threshold",
            format!("{} is outside (0, 1]", threshold),
        ))
    }
}

/// A window is a detection when its probability meets or exceeds the threshold
pub fn is_detection(score: f64, threshold: f64) -> bool {
    score >= threshold
}

/// Validated threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholder {
    threshold: f64,
}

impl Thresholder {
    pub fn new(threshold: f64) -> Result<Self, ScanError> {
        validate_threshold(threshold)?;
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_detection(&self, score: f64) -> bool {
        is_detection(score, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let thresholder = Thresholder::new(0.6).unwrap();
        assert!(thresholder.is_detection(0.6));
        assert!(thresholder.is_detection(0.95));
        assert!(!thresholder.is_detection(0.5999));
    }

    #[test]
    fn test_threshold_of_one_requires_certainty() {
        let thresholder = Thresholder::new(1.0).unwrap();
        assert!(thresholder.is_detection(1.0));
        assert!(!thresholder.is_detection(0.999));
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(Thresholder::new(0.0).is_err());
        assert!(Thresholder::new(1.5).is_err());
        assert!(Thresholder::new(f64::NAN).is_err());
    }
}
