//! Model lifecycle
//!
//! Daily retraining, evaluation against the active model and promotion of
//! candidates that clear the improvement gate.

mod evaluator;
mod ledger;
mod registry;
mod scheduler;


pub use evaluator::{should_promote, MetricDeltas, UpdateDecision, IMPROVEMENT_THRESHOLD};
pub use ledger::{RetryPolicy, RunLedger, RunRecord};
pub use registry::{ModelRegistry, RegistryConfig};
pub use scheduler::{
    CycleOutcome, CyclePhase, SchedulerConfig, SchedulerStats, UpdateScheduler,
    UpdateSchedulerBuilder, DEFAULT_CHECK_INTERVAL, DEFAULT_TRIGGER_HOUR,
};

use crate::models::{ArtifactRef, CandidateModel, Dataset, ModelMetrics};
use anyhow::Result;
use async_trait::async_trait;

/// Training side of the update cycle
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Gather the latest labelled match data
    async fn collect_training_data(&self) -> Result<Dataset>;

    /// Train a candidate model on `dataset`
    async fn train(&self, dataset: &Dataset) -> Result<CandidateModel>;
}

/// Evaluates model artifacts against a dataset
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn evaluate(&self, artifact: &ArtifactRef, dataset: &Dataset) -> Result<ModelMetrics>;
}
