//! Placeholder predictions served when validation fails

use super::validator::ValidationReason;
use crate::models::Prediction;
use std::collections::BTreeMap;

/// Builds the null-score placeholder returned in place of a rejected
/// prediction. Fallbacks are never cached.
pub struct FallbackPredictor;

impl FallbackPredictor {
    pub fn predict(match_id: &str, reason: ValidationReason) -> Prediction {
        Prediction {
            home_score: None,
            away_score: None,
            confidence: 0.0,
            probabilities: BTreeMap::new(),
            features: BTreeMap::new(),
            message: Some(format!(
                "Prediction unavailable for match {}: {}",
                match_id, reason
            )),
        }
    }
}
