//! Prediction request path
//!
//! Validation, fallback handling and the orchestrator that ties the cache
//! to the external prediction engine.

mod fallback;
mod orchestrator;
mod validator;

pub use fallback::FallbackPredictor;
pub use orchestrator::{
    OrchestratorConfig, OrchestratorStats, PredictionOrchestrator, PredictionOrchestratorBuilder,
    PredictionSource, ServedPrediction, DEFAULT_MAX_CONCURRENT_GENERATIONS,
};
pub use validator::{
    PredictionValidator, ValidationOutcome, ValidationReason, MAX_GOALS, MAX_PROBABILITY_SUM,
    MIN_CONFIDENCE, REQUIRED_FEATURES,
};

use crate::models::Prediction;
use anyhow::Result;
use async_trait::async_trait;

/// Source of raw match predictions
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    /// Generate a prediction for `match_id`; failures may be transient
    async fn generate(&self, match_id: &str) -> Result<Prediction>;
}
