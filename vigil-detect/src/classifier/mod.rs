//! Sequence classifier boundary
//!
//! The classifier is opaque: a [`Sequence`] goes in, a score in [0, 1]
//! comes out. Scores below [`POSITIVE_THRESHOLD`] are positive detections.

pub mod serving;

use crate::error::{Error, Result};
use crate::pipeline::frame::{Sequence, CHANNELS, FRAME_HEIGHT, FRAME_WIDTH, SEQUENCE_LENGTH};
use async_trait::async_trait;

pub use serving::ServingClassifier;

/// Scores strictly below this are positive
pub const POSITIVE_THRESHOLD: f32 = 0.5;

/// Input shape every classifier must accept: `[frames, height, width, channels]`
pub const EXPECTED_INPUT_SHAPE: [usize; 4] = [SEQUENCE_LENGTH, FRAME_HEIGHT, FRAME_WIDTH, CHANNELS];

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Per-sample input shape, excluding the batch dimension
    fn input_shape(&self) -> [usize; 4];

    /// Score one sequence
    async fn classify(&self, sequence: &Sequence) -> Result<f32>;
}

/// Interpreted classifier output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionResult {
    pub is_positive: bool,
    /// Raw classifier score
    pub confidence: f32,
}

impl DetectionResult {
    /// Apply the decision threshold, rejecting scores outside [0, 1]
    pub fn from_score(score: f32) -> Result<Self> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(Error::Classifier(format!("score out of range: {}", score)));
        }
        Ok(Self {
            is_positive: score < POSITIVE_THRESHOLD,
            confidence: score,
        })
    }
}

/// Startup check: a mismatched model is a fatal misconfiguration
pub fn validate_input_shape(classifier: &dyn Classifier) -> Result<()> {
    let shape = classifier.input_shape();
    if shape != EXPECTED_INPUT_SHAPE {
        return Err(Error::Config(format!(
            "classifier input shape mismatch: expected {:?}, got {:?}",
            EXPECTED_INPUT_SHAPE, shape
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedShape([usize; 4]);

    #[async_trait]
    impl Classifier for FixedShape {
        fn input_shape(&self) -> [usize; 4] {
            self.0
        }

        async fn classify(&self, _sequence: &Sequence) -> Result<f32> {
            Ok(1.0)
        }
    }

    #[test]
    fn test_threshold() {
        assert!(DetectionResult::from_score(0.49).unwrap().is_positive);
        assert!(!DetectionResult::from_score(0.5).unwrap().is_positive);
        assert!(!DetectionResult::from_score(0.97).unwrap().is_positive);
        assert_eq!(DetectionResult::from_score(0.12).unwrap().confidence, 0.12);
    }

    #[test]
    fn test_invalid_scores_rejected() {
        assert!(DetectionResult::from_score(f32::NAN).is_err());
        assert!(DetectionResult::from_score(-0.1).is_err());
        assert!(DetectionResult::from_score(1.5).is_err());
    }

    #[test]
    fn test_shape_validation() {
        assert!(validate_input_shape(&FixedShape(EXPECTED_INPUT_SHAPE)).is_ok());
        assert!(matches!(
            validate_input_shape(&FixedShape([16, 64, 64, 3])),
            Err(Error::Config(_))
        ));
    }
}
