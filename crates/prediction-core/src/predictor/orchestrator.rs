//! Request-path prediction orchestration
//!
//! Answers `get_prediction(match_id)` from the TTL cache when possible and
//! otherwise asks the prediction engine, validating the result before it is
//! cached. Rejected predictions are replaced by a fallback and never cached.

use super::fallback::FallbackPredictor;
use super::validator::PredictionValidator;
use super::PredictionEngine;
use crate::cache::TtlCache;
use crate::error::PredictionError;
use crate::health::{components, HealthRegistry};
use crate::models::Prediction;
use crate::observability::StructuredLogger;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Default cap on concurrent prediction engine calls
pub const DEFAULT_MAX_CONCURRENT_GENERATIONS: usize = 64;

/// Configuration for the prediction orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum engine generations in flight; cache hits are not limited
    pub max_concurrent_generations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: DEFAULT_MAX_CONCURRENT_GENERATIONS,
        }
    }
}

/// Where a served prediction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Cache,
    Engine,
    Fallback,
}

impl fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionSource::Cache => write!(f, "cache"),
            PredictionSource::Engine => write!(f, "engine"),
            PredictionSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A prediction together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedPrediction {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub source: PredictionSource,
}

impl ServedPrediction {
    /// Returns true for the null-score placeholder
    pub fn is_fallback(&self) -> bool {
        self.source == PredictionSource::Fallback
    }
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
    engine_failures: AtomicU64,
}

/// Request statistics of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fallbacks: u64,
    pub engine_failures: u64,
}

/// Entry point of the request path
pub struct PredictionOrchestrator {
    engine: Arc<dyn PredictionEngine>,
    cache: TtlCache,
    validator: PredictionValidator,
    generation_permits: Semaphore,
    health: HealthRegistry,
    logger: StructuredLogger,
    counters: Counters,
}

impl PredictionOrchestrator {
    /// Create an orchestrator with a private health registry and default logger
    pub fn new(
        engine: Arc<dyn PredictionEngine>,
        cache: TtlCache,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            validator: PredictionValidator::new(),
            generation_permits: Semaphore::new(
                config
                    .max_concurrent_generations
                    .min(Semaphore::MAX_PERMITS),
            ),
            health: HealthRegistry::new(),
            logger: StructuredLogger::default(),
            counters: Counters::default(),
        }
    }

    /// Serve a prediction for `match_id`.
    ///
    /// Returns a cached or freshly validated prediction, or a fallback when
    /// validation rejects the engine output. Engine and cache failures are
    /// returned as errors.
    pub async fn get_prediction(&self, match_id: &str) -> Result<ServedPrediction, PredictionError> {
        let start = Instant::now();

        if let Some(cached) = self.lookup(match_id).await? {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(self.served(match_id, cached, PredictionSource::Cache, start));
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let prediction = self.generate(match_id).await?;

        let outcome = self.validator.validate(&prediction);
        if !outcome.accepted {
            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
            self.logger.log_prediction_rejected(match_id, outcome.reason);
            let fallback = FallbackPredictor::predict(match_id, outcome.reason);
            return Ok(self.served(match_id, fallback, PredictionSource::Fallback, start));
        }

        if let Err(e) = self
            .cache
            .set(match_id, &prediction, self.cache.default_ttl())
            .await
        {
            self.health
                .set_degraded(components::CACHE, e.to_string())
                .await;
            return Err(e.into());
        }

        Ok(self.served(match_id, prediction, PredictionSource::Engine, start))
    }

    async fn lookup(&self, match_id: &str) -> Result<Option<Prediction>, PredictionError> {
        match self.cache.get(match_id).await {
            Ok(cached) => {
                self.health.recover(components::CACHE).await;
                Ok(cached)
            }
            Err(e) => {
                self.health
                    .set_degraded(components::CACHE, e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }

    async fn generate(&self, match_id: &str) -> Result<Prediction, PredictionError> {
        let _permit = self
            .generation_permits
            .acquire()
            .await
            .map_err(|_| PredictionError::Unavailable)?;

        match self.engine.generate(match_id).await {
            Ok(prediction) => {
                self.health.recover(components::PREDICTION_ENGINE).await;
                Ok(prediction)
            }
            Err(cause) => {
                self.counters.engine_failures.fetch_add(1, Ordering::Relaxed);
                self.logger.log_engine_failure(match_id, format!("{:#}", cause));
                self.health
                    .set_degraded(components::PREDICTION_ENGINE, format!("{:#}", cause))
                    .await;
                Err(PredictionError::Engine {
                    match_id: match_id.to_string(),
                    cause,
                })
            }
        }
    }

    fn served(
        &self,
        match_id: &str,
        prediction: Prediction,
        source: PredictionSource,
        start: Instant,
    ) -> ServedPrediction {
        self.logger.log_prediction_served(
            match_id,
            source,
            prediction.confidence,
            start.elapsed().as_micros() as u64,
        );
        ServedPrediction { prediction, source }
    }

    /// Stop accepting requests that need the engine; cache hits still serve
    pub fn close(&self) {
        self.generation_permits.close();
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            engine_failures: self.counters.engine_failures.load(Ordering::Relaxed),
        }
    }
}

/// Builder wiring the orchestrator's collaborators
pub struct PredictionOrchestratorBuilder {
    engine: Option<Arc<dyn PredictionEngine>>,
    cache: Option<TtlCache>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: OrchestratorConfig,
}

impl PredictionOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            cache: None,
            health: None,
            logger: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn engine(mut self, engine: Arc<dyn PredictionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cache(mut self, cache: TtlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report into a shared health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrent_generations(mut self, limit: usize) -> Self {
        self.config.max_concurrent_generations = limit;
        self
    }

    pub fn build(self) -> Result<PredictionOrchestrator> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Prediction engine is required"))?;
        let cache = self
            .cache
            .ok_or_else(|| anyhow::anyhow!("Cache is required"))?;
        if self.config.max_concurrent_generations == 0 {
            anyhow::bail!("max_concurrent_generations must be at least 1");
        }
        if self.config.max_concurrent_generations > Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "max_concurrent_generations must be at most {}",
                Semaphore::MAX_PERMITS
            );
        }

        let mut orchestrator = PredictionOrchestrator::new(engine, cache, self.config);
        if let Some(health) = self.health {
            orchestrator.health = health;
        }
        if let Some(logger) = self.logger {
            orchestrator.logger = logger;
        }
        Ok(orchestrator)
    }
}

impl Default for PredictionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
