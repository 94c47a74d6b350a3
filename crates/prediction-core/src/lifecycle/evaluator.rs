//! Promotion gate comparing active and candidate model metrics

use crate::models::ModelMetrics;
use serde::Serialize;

/// Minimum improvement every tracked metric must exceed
pub const IMPROVEMENT_THRESHOLD: f64 = 0.02;

/// Per-metric improvement of a candidate; positive means better
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricDeltas {
    pub accuracy: f64,
    pub rmse: f64,
    pub log_loss: f64,
}

impl MetricDeltas {
    /// Accuracy is higher-is-better, rmse and log loss are lower-is-better
    pub fn between(current: &ModelMetrics, candidate: &ModelMetrics) -> Self {
        Self {
            accuracy: candidate.accuracy - current.accuracy,
            rmse: current.rmse - candidate.rmse,
            log_loss: current.log_loss - candidate.log_loss,
        }
    }

    fn all_exceed(&self, threshold: f64) -> bool {
        self.accuracy > threshold && self.rmse > threshold && self.log_loss > threshold
    }
}

/// Outcome of comparing a candidate against the active model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpdateDecision {
    pub promote: bool,
    pub deltas: MetricDeltas,
}

impl UpdateDecision {
    pub fn from_deltas(deltas: MetricDeltas) -> Self {
        Self {
            promote: deltas.all_exceed(IMPROVEMENT_THRESHOLD),
            deltas,
        }
    }
}

/// Decide whether `candidate` replaces `current`.
///
/// Every metric has to improve by strictly more than
/// [`IMPROVEMENT_THRESHOLD`]; a regression in any one of them blocks
/// promotion no matter how much the others improve.
pub fn should_promote(current: &ModelMetrics, candidate: &ModelMetrics) -> UpdateDecision {
    UpdateDecision::from_deltas(MetricDeltas::between(current, candidate))
}
