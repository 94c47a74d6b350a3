//! Validation rules applied to freshly generated predictions

use crate::models::Prediction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum confidence for a prediction to be trusted
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Maximum tolerated sum of outcome probabilities
pub const MAX_PROBABILITY_SUM: f64 = 1.1;

/// Highest plausible goal count for either side
pub const MAX_GOALS: f64 = 10.0;

/// Features a prediction must have been computed from
pub const REQUIRED_FEATURES: [&str; 4] = [
    "team_form",
    "historical_performance",
    "player_statistics",
    "weather_conditions",
];

/// Why a prediction was accepted or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    LowConfidence,
    InconsistentProbabilities,
    ScoreOutOfRange,
    MissingFeatures,
    Ok,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationReason::LowConfidence => "confidence below threshold",
            ValidationReason::InconsistentProbabilities => "inconsistent probabilities",
            ValidationReason::ScoreOutOfRange => "predicted score out of range",
            ValidationReason::MissingFeatures => "missing or incomplete input features",
            ValidationReason::Ok => "valid prediction",
        };
        f.write_str(text)
    }
}

/// Result of validating one prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub accepted: bool,
    pub reason: ValidationReason,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: ValidationReason::Ok,
        }
    }

    pub fn rejected(reason: ValidationReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

/// Stateless rule engine with fixed thresholds.
///
/// Rules run in a fixed order and the first failing rule decides the
/// reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionValidator;

impl PredictionValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, prediction: &Prediction) -> ValidationOutcome {
        let confidence = prediction.confidence;
        if !confidence.is_finite() || confidence < MIN_CONFIDENCE {
            return ValidationOutcome::rejected(ValidationReason::LowConfidence);
        }

        let probability_sum = prediction.probability_sum();
        if !probability_sum.is_finite() || probability_sum > MAX_PROBABILITY_SUM {
            return ValidationOutcome::rejected(ValidationReason::InconsistentProbabilities);
        }

        if !score_in_range(prediction.home_score) || !score_in_range(prediction.away_score) {
            return ValidationOutcome::rejected(ValidationReason::ScoreOutOfRange);
        }

        if !REQUIRED_FEATURES
            .iter()
            .all(|feature| prediction.features.contains_key(*feature))
        {
            return ValidationOutcome::rejected(ValidationReason::MissingFeatures);
        }

        ValidationOutcome::accepted()
    }
}

/// A generated score must be present and within `0..=MAX_GOALS`
fn score_in_range(score: Option<f64>) -> bool {
    matches!(score, Some(goals) if (0.0..=MAX_GOALS).contains(&goals))
}
