//! Service wiring
//!
//! Assembles the cache, orchestrator, registry and update scheduler from a
//! [`ServiceConfig`] and owns the scheduler's background task.

use crate::cache::{InMemoryStore, KeyValueStore, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::error::PredictionError;
use crate::health::{HealthRegistry, HealthResponse, ReadinessResponse};
use crate::lifecycle::{
    MetricsStore, ModelRegistry, ModelTrainer, RunLedger, UpdateScheduler, UpdateSchedulerBuilder,
};
use crate::models::ModelVersion;
use crate::observability::StructuredLogger;
use crate::predictor::{
    PredictionEngine, PredictionOrchestrator, PredictionOrchestratorBuilder, ServedPrediction,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// External collaborators the service is built around
pub struct ServiceDependencies {
    pub engine: Arc<dyn PredictionEngine>,
    pub trainer: Arc<dyn ModelTrainer>,
    pub metrics_store: Arc<dyn MetricsStore>,
    pub initial_model: ModelVersion,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDependencies {
    /// Dependencies with an in-process store and the system clock
    pub fn new(
        engine: Arc<dyn PredictionEngine>,
        trainer: Arc<dyn ModelTrainer>,
        metrics_store: Arc<dyn MetricsStore>,
        initial_model: ModelVersion,
    ) -> Self {
        Self {
            engine,
            trainer,
            metrics_store,
            initial_model,
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Running prediction service
pub struct PredictionService {
    orchestrator: Arc<PredictionOrchestrator>,
    scheduler: Arc<UpdateScheduler>,
    health: HealthRegistry,
    logger: StructuredLogger,
    shutdown_tx: broadcast::Sender<()>,
    scheduler_handle: JoinHandle<()>,
}

impl PredictionService {
    /// Wire all components and start the update scheduler loop
    pub async fn start(config: &ServiceConfig, deps: ServiceDependencies) -> Result<Self> {
        let health = HealthRegistry::for_service().await;
        let logger = StructuredLogger::new(&config.service_name);

        let ledger = match &config.scheduler.ledger_path {
            Some(path) => RunLedger::open(path)
                .with_context(|| format!("Failed to open run ledger at {}", path.display()))?,
            None => RunLedger::in_memory(),
        };

        let registry = Arc::new(ModelRegistry::new(
            deps.initial_model,
            config.registry_config(),
        ));

        let cache = TtlCache::new(deps.store, deps.clock.clone(), config.cache_config());

        let orchestrator = PredictionOrchestratorBuilder::new()
            .engine(deps.engine)
            .cache(cache)
            .health(health.clone())
            .logger(logger.clone())
            .config(config.orchestrator_config())
            .build()?;

        let scheduler = UpdateSchedulerBuilder::new()
            .registry(registry.clone())
            .trainer(deps.trainer)
            .metrics_store(deps.metrics_store)
            .ledger(ledger)
            .clock(deps.clock)
            .health(health.clone())
            .logger(logger.clone())
            .config(config.scheduler_config())
            .build()?;
        let scheduler = Arc::new(scheduler);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let scheduler_handle = tokio::spawn(scheduler.clone().run(shutdown_rx));

        health.set_ready(true);
        logger.log_startup(SERVICE_VERSION, registry.version().await);

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            scheduler,
            health,
            logger,
            shutdown_tx,
            scheduler_handle,
        })
    }

    /// Serve a prediction for `match_id`
    pub async fn get_prediction(&self, match_id: &str) -> Result<ServedPrediction, PredictionError> {
        self.orchestrator.get_prediction(match_id).await
    }

    pub fn orchestrator(&self) -> &Arc<PredictionOrchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &Arc<UpdateScheduler> {
        &self.scheduler
    }

    pub async fn health(&self) -> HealthResponse {
        self.health.health().await
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        self.health.readiness().await
    }

    /// Stop the scheduler loop and refuse new engine generations.
    ///
    /// An update cycle already in flight runs to completion first.
    pub async fn shutdown(self, reason: &str) -> Result<()> {
        self.health.set_ready(false);
        self.orchestrator.close();

        // The loop may already have exited; a send error is fine then
        let _ = self.shutdown_tx.send(());
        self.scheduler_handle
            .await
            .context("Model update scheduler task panicked")?;

        self.logger.log_shutdown(reason);
        info!("Prediction service stopped");
        Ok(())
    }
}
