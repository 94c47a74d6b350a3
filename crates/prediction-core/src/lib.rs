//! Prediction serving and model lifecycle core
//!
//! This crate provides:
//! - A TTL cache of validated match predictions
//! - Validation of raw engine output with null-score fallbacks
//! - The request orchestrator tying cache, engine and validator together
//! - Daily retraining with metric-gated promotion of candidate models
//! - Health tracking, structured logging and configuration

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod service;

pub use cache::{CacheConfig, InMemoryStore, KeyValueStore, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServiceConfig;
pub use error::{CacheError, CycleError, LedgerError, PredictionError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::{
    should_promote, CycleOutcome, MetricsStore, ModelRegistry, ModelTrainer, UpdateDecision,
    UpdateScheduler, UpdateSchedulerBuilder,
};
pub use models::*;
pub use observability::{init_tracing, LogFormat, StructuredLogger};
pub use predictor::{
    PredictionEngine, PredictionOrchestrator, PredictionOrchestratorBuilder, PredictionSource,
    PredictionValidator, ServedPrediction,
};
pub use service::{PredictionService, ServiceDependencies};
