//! Model update scheduling loop
//!
//! Wakes on a fixed cadence and, once per day at the trigger hour, runs the
//! collect → evaluate → train → evaluate → decide → promote cycle. The whole
//! cycle runs under one exclusive lock; a trigger that finds the lock taken
//! is skipped rather than queued.

use super::evaluator::{should_promote, UpdateDecision};
use super::ledger::{RetryPolicy, RunLedger};
use super::registry::ModelRegistry;
use super::{MetricsStore, ModelTrainer};
use crate::clock::{Clock, SystemClock};
use crate::error::CycleError;
use crate::health::{components, HealthRegistry};
use crate::models::{ModelMetrics, VersionNumber};
use crate::observability::StructuredLogger;
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Timelike};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Local hour at which the daily update runs (03:00)
pub const DEFAULT_TRIGGER_HOUR: u32 = 3;

/// How often the scheduler wakes to check the trigger condition
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the update scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Local hour (0-23) during which the daily cycle starts
    pub trigger_hour: u32,
    /// Wake-up cadence of the background loop
    pub check_interval: Duration,
    /// Whether a failed attempt consumes the day
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger_hour: DEFAULT_TRIGGER_HOUR,
            check_interval: DEFAULT_CHECK_INTERVAL,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Phase of the update cycle currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Collecting,
    Evaluating,
    TrainingCandidate,
    EvaluatingCandidate,
    Deciding,
    Promoting,
}

/// How a triggered cycle ended
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Promoted {
        from: VersionNumber,
        to: VersionNumber,
        decision: UpdateDecision,
    },
    Rejected {
        decision: UpdateDecision,
    },
    /// Another cycle held the lock, or today's run already happened
    Skipped,
    Failed(Arc<CycleError>),
}

impl CycleOutcome {
    pub fn is_promoted(&self) -> bool {
        matches!(self, CycleOutcome::Promoted { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Promoted { .. } => "promoted",
            CycleOutcome::Rejected { .. } => "rejected",
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

/// Statistics about update cycles
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub cycles_run: u64,
    pub promotions: u64,
    pub rejections: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_outcome: Option<&'static str>,
    pub last_cycle_duration: Option<Duration>,
}

/// Background driver of model retraining and promotion
pub struct UpdateScheduler {
    registry: Arc<ModelRegistry>,
    trainer: Arc<dyn ModelTrainer>,
    metrics_store: Arc<dyn MetricsStore>,
    ledger: RunLedger,
    clock: Arc<dyn Clock>,
    health: HealthRegistry,
    logger: StructuredLogger,
    config: SchedulerConfig,
    cycle_lock: Mutex<()>,
    phase_tx: watch::Sender<CyclePhase>,
    stats: RwLock<SchedulerStats>,
}

impl UpdateScheduler {
    /// Run the wake-up loop until `shutdown` fires
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            trigger_hour = self.config.trigger_hour,
            interval_secs = self.config.check_interval.as_secs(),
            retry_policy = ?self.config.retry_policy,
            "Starting model update scheduler"
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down model update scheduler");
                    break;
                }
            }
        }
    }

    /// Check the trigger condition once and run a cycle if it is due
    pub async fn tick(&self) -> Option<CycleOutcome> {
        let now = self.clock.now();
        if !self.is_due(now) {
            debug!(hour = now.hour(), "Model update not due");
            return None;
        }

        Some(self.run_guarded(Some(now.date_naive())).await)
    }

    /// Due when inside the trigger hour and today's run has not happened yet
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now.hour() == self.config.trigger_hour
            && !self
                .ledger
                .has_run_on(now.date_naive(), self.config.retry_policy)
    }

    /// Run a cycle immediately, outside the daily schedule.
    ///
    /// Manual runs share the cycle lock but do not consume the day's
    /// scheduled run.
    pub async fn trigger_now(&self) -> CycleOutcome {
        self.run_guarded(None).await
    }

    async fn run_guarded(&self, scheduled_for: Option<NaiveDate>) -> CycleOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            self.logger
                .log_cycle_skipped("another update cycle is in progress");
            return self.record(CycleOutcome::Skipped, None).await;
        };

        if let Some(date) = scheduled_for {
            // Re-checked under the lock so a racing trigger cannot double-run
            if self.ledger.has_run_on(date, self.config.retry_policy) {
                self.logger.log_cycle_skipped("already ran today");
                return self.record(CycleOutcome::Skipped, None).await;
            }
            if let Err(e) = self.ledger.mark_attempt(date) {
                warn!(error = %e, "Failed to persist update attempt");
            }
        }

        let start = Instant::now();
        let result = self.run_cycle().await;
        self.set_phase(CyclePhase::Idle);

        let outcome = match result {
            Ok(outcome) => {
                if let Some(date) = scheduled_for {
                    if let Err(e) = self.ledger.mark_success(date) {
                        warn!(error = %e, "Failed to persist update success");
                    }
                }
                self.health.recover(components::MODEL_UPDATER).await;
                outcome
            }
            Err(e) => {
                let recoverable = e.is_recoverable();
                self.logger.log_update_failed(&e, recoverable);
                if recoverable {
                    self.health
                        .set_degraded(components::MODEL_UPDATER, e.to_string())
                        .await;
                } else {
                    // Stays unhealthy until a later cycle completes
                    self.health
                        .set_unhealthy(components::MODEL_UPDATER, e.to_string())
                        .await;
                    if cfg!(debug_assertions) {
                        panic!("model update cycle hit a contract violation: {}", e);
                    }
                }
                CycleOutcome::Failed(Arc::new(e))
            }
        };

        self.record(outcome, Some(start.elapsed())).await
    }

    async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        info!("Starting model update cycle");

        self.set_phase(CyclePhase::Collecting);
        let dataset = self
            .trainer
            .collect_training_data()
            .await
            .map_err(CycleError::DataCollection)?;
        debug!(dataset = %dataset.id, samples = dataset.samples, "Collected training data");

        self.set_phase(CyclePhase::Evaluating);
        let active = self.registry.active().await;
        let current_metrics = self
            .metrics_store
            .evaluate(&active.artifact, &dataset)
            .await
            .map_err(CycleError::CurrentEvaluation)?;
        ensure_finite(&current_metrics, "active")?;

        self.set_phase(CyclePhase::TrainingCandidate);
        let candidate = self
            .trainer
            .train(&dataset)
            .await
            .map_err(CycleError::Training)?;

        self.set_phase(CyclePhase::EvaluatingCandidate);
        let candidate_metrics = self
            .metrics_store
            .evaluate(&candidate.artifact, &dataset)
            .await
            .map_err(CycleError::CandidateEvaluation)?;
        ensure_finite(&candidate_metrics, "candidate")?;

        self.set_phase(CyclePhase::Deciding);
        let decision = should_promote(&current_metrics, &candidate_metrics);
        if !decision.promote {
            self.logger
                .log_model_rejected(active.version, &decision.deltas);
            return Ok(CycleOutcome::Rejected { decision });
        }

        self.set_phase(CyclePhase::Promoting);
        let promoted = self.registry.promote(candidate, candidate_metrics).await;
        self.logger
            .log_model_promoted(active.version, promoted.version, &decision.deltas);

        Ok(CycleOutcome::Promoted {
            from: active.version,
            to: promoted.version,
            decision,
        })
    }

    /// Reactivate the previously active model version.
    ///
    /// Waits for an in-flight cycle to finish so a rollback never races a
    /// promotion.
    pub async fn rollback(&self) -> Option<VersionNumber> {
        let _guard = self.cycle_lock.lock().await;

        let from = self.registry.version().await;
        let restored = self.registry.rollback().await?;
        self.logger.log_model_rollback(from, restored.version);
        Some(restored.version)
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.phase_tx.send_replace(phase);
    }

    async fn record(&self, outcome: CycleOutcome, duration: Option<Duration>) -> CycleOutcome {
        let mut stats = self.stats.write().await;
        match &outcome {
            CycleOutcome::Promoted { .. } => stats.promotions += 1,
            CycleOutcome::Rejected { .. } => stats.rejections += 1,
            CycleOutcome::Failed(_) => stats.failures += 1,
            CycleOutcome::Skipped => stats.skipped += 1,
        }
        if duration.is_some() {
            stats.cycles_run += 1;
            stats.last_cycle_duration = duration;
        }
        stats.last_outcome = Some(outcome.label());
        outcome
    }

    /// Phase of the cycle currently in flight
    pub fn phase(&self) -> CyclePhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }
}

fn ensure_finite(metrics: &ModelMetrics, subject: &'static str) -> Result<(), CycleError> {
    if metrics.is_finite() {
        Ok(())
    } else {
        Err(CycleError::MalformedMetrics { subject })
    }
}

/// Builder wiring the scheduler's collaborators
pub struct UpdateSchedulerBuilder {
    registry: Option<Arc<ModelRegistry>>,
    trainer: Option<Arc<dyn ModelTrainer>>,
    metrics_store: Option<Arc<dyn MetricsStore>>,
    ledger: Option<RunLedger>,
    clock: Option<Arc<dyn Clock>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: SchedulerConfig,
}

impl UpdateSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            trainer: None,
            metrics_store: None,
            ledger: None,
            clock: None,
            health: None,
            logger: None,
            config: SchedulerConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn trainer(mut self, trainer: Arc<dyn ModelTrainer>) -> Self {
        self.trainer = Some(trainer);
        self
    }

    pub fn metrics_store(mut self, metrics_store: Arc<dyn MetricsStore>) -> Self {
        self.metrics_store = Some(metrics_store);
        self
    }

    /// Set the run ledger (default: in-memory)
    pub fn ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set the clock (default: system clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn trigger_hour(mut self, hour: u32) -> Self {
        self.config.trigger_hour = hour;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval = interval;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn build(self) -> Result<UpdateScheduler> {
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Model registry is required"))?;
        let trainer = self
            .trainer
            .ok_or_else(|| anyhow::anyhow!("Model trainer is required"))?;
        let metrics_store = self
            .metrics_store
            .ok_or_else(|| anyhow::anyhow!("Metrics store is required"))?;

        if self.config.trigger_hour > 23 {
            anyhow::bail!(
                "trigger_hour must be between 0 and 23, got {}",
                self.config.trigger_hour
            );
        }
        if self.config.check_interval.is_zero() {
            anyhow::bail!("check_interval must be non-zero");
        }

        let (phase_tx, _) = watch::channel(CyclePhase::Idle);

        Ok(UpdateScheduler {
            registry,
            trainer,
            metrics_store,
            ledger: self.ledger.unwrap_or_else(RunLedger::in_memory),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            health: self.health.unwrap_or_default(),
            logger: self.logger.unwrap_or_default(),
            config: self.config,
            cycle_lock: Mutex::new(()),
            phase_tx,
            stats: RwLock::new(SchedulerStats::default()),
        })
    }
}

impl Default for UpdateSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_metrics_are_contract_violations() {
        let err = ensure_finite(&ModelMetrics::new(0.7, f64::NAN, 0.5), "candidate").unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "candidate model produced non-finite metrics");

        assert!(ensure_finite(&ModelMetrics::new(0.7, 1.0, 0.5), "active").is_ok());
    }

    #[test]
    fn test_default_config_runs_at_three() {
        let config = SchedulerConfig::default();
        assert_eq!(config.trigger_hour, 3);
        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert_eq!(config.retry_policy, RetryPolicy::OncePerDay);
    }
}
