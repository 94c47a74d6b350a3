//! Integration tests for the assembled prediction service

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use config::{Config, File, FileFormat};
use prediction_core::{
    health::components,
    lifecycle::{RunLedger, RunRecord},
    ArtifactRef, CandidateModel, ComponentStatus, CycleOutcome, Dataset, ManualClock,
    MetricsStore, ModelMetrics, ModelTrainer, ModelVersion, Prediction, PredictionEngine,
    PredictionError, PredictionService, PredictionSource, ServiceConfig, ServiceDependencies,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 6, day, hour, minute, 0)
        .earliest()
        .unwrap()
}

fn prediction(confidence: f64) -> Prediction {
    let probabilities = BTreeMap::from([
        ("home_win".to_string(), 0.5),
        ("draw".to_string(), 0.3),
        ("away_win".to_string(), 0.2),
    ]);
    let features = BTreeMap::from([
        ("team_form".to_string(), json!([1, 1, 0])),
        ("historical_performance".to_string(), json!({ "wins": 12 })),
        ("player_statistics".to_string(), json!({ "injuries": 1 })),
        ("weather_conditions".to_string(), json!("dry")),
    ]);

    Prediction {
        home_score: Some(2.0),
        away_score: Some(1.0),
        confidence,
        probabilities,
        features,
        message: None,
    }
}

/// Engine returning a fixed prediction, or failing when `output` is `None`
struct FixedEngine {
    output: Mutex<Option<Prediction>>,
    calls: AtomicUsize,
}

impl FixedEngine {
    fn new(output: Option<Prediction>) -> Self {
        Self {
            output: Mutex::new(output),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionEngine for FixedEngine {
    async fn generate(&self, _match_id: &str) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.output.lock().unwrap().clone() {
            Some(prediction) => Ok(prediction),
            None => bail!("model server returned 503"),
        }
    }
}

struct StaticTrainer;

#[async_trait]
impl ModelTrainer for StaticTrainer {
    async fn collect_training_data(&self) -> Result<Dataset> {
        Ok(Dataset {
            id: "weekend-fixtures".to_string(),
            samples: 380,
            collected_at: Utc::now(),
        })
    }

    async fn train(&self, _dataset: &Dataset) -> Result<CandidateModel> {
        Ok(CandidateModel {
            artifact: ArtifactRef::new("models/retrained"),
            trained_at: Utc::now(),
        })
    }
}

/// Candidates always beat the base model on every metric
struct ImprovingMetrics;

#[async_trait]
impl MetricsStore for ImprovingMetrics {
    async fn evaluate(&self, artifact: &ArtifactRef, _dataset: &Dataset) -> Result<ModelMetrics> {
        if artifact.as_str() == "models/base" {
            Ok(ModelMetrics::new(0.70, 1.0, 0.5))
        } else {
            Ok(ModelMetrics::new(0.75, 0.9, 0.4))
        }
    }
}

fn initial_model() -> ModelVersion {
    ModelVersion::initial(
        ArtifactRef::new("models/base"),
        ModelMetrics::new(0.70, 1.0, 0.5),
    )
}

async fn start_service(
    config: &ServiceConfig,
    engine: Arc<FixedEngine>,
    clock: Arc<ManualClock>,
) -> PredictionService {
    let deps = ServiceDependencies::new(
        engine,
        Arc::new(StaticTrainer),
        Arc::new(ImprovingMetrics),
        initial_model(),
    )
    .with_clock(clock);

    PredictionService::start(config, deps).await.unwrap()
}

#[tokio::test]
async fn test_prediction_is_cached_until_ttl_expires() {
    let engine = Arc::new(FixedEngine::new(Some(prediction(0.8))));
    let clock = Arc::new(ManualClock::new(at(10, 12, 0)));
    let service = start_service(&ServiceConfig::default(), engine.clone(), clock.clone()).await;

    let first = service.get_prediction("match-42").await.unwrap();
    assert_eq!(first.source, PredictionSource::Engine);
    assert_eq!(first.prediction, prediction(0.8));

    clock.advance(ChronoDuration::hours(5));
    let second = service.get_prediction("match-42").await.unwrap();
    assert_eq!(second.source, PredictionSource::Cache);
    assert_eq!(second.prediction, first.prediction);
    assert_eq!(engine.calls(), 1);

    clock.advance(ChronoDuration::hours(1));
    let third = service.get_prediction("match-42").await.unwrap();
    assert_eq!(third.source, PredictionSource::Engine);
    assert_eq!(engine.calls(), 2);

    let stats = service.orchestrator().stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 2);

    service.shutdown("test complete").await.unwrap();
}

#[tokio::test]
async fn test_rejected_prediction_served_as_uncached_fallback() {
    let engine = Arc::new(FixedEngine::new(Some(prediction(0.3))));
    let clock = Arc::new(ManualClock::new(at(10, 12, 0)));
    let service = start_service(&ServiceConfig::default(), engine.clone(), clock).await;

    let served = service.get_prediction("match-7").await.unwrap();
    assert!(served.is_fallback());
    assert!(served.prediction.is_scoreless());
    assert_eq!(served.prediction.confidence, 0.0);
    assert!(served
        .prediction
        .message
        .as_deref()
        .is_some_and(|message| message.contains("match-7")));

    service.get_prediction("match-7").await.unwrap();
    assert_eq!(engine.calls(), 2);
    assert_eq!(service.orchestrator().stats().fallbacks, 2);

    service.shutdown("test complete").await.unwrap();
}

#[tokio::test]
async fn test_engine_failure_degrades_health() {
    let engine = Arc::new(FixedEngine::new(None));
    let clock = Arc::new(ManualClock::new(at(10, 12, 0)));
    let service = start_service(&ServiceConfig::default(), engine.clone(), clock).await;

    assert!(service.readiness().await.ready);

    let err = service.get_prediction("match-9").await.unwrap_err();
    assert!(matches!(err, PredictionError::Engine { .. }));
    assert!(err.to_string().contains("model server returned 503"));

    let health = service.health().await;
    assert_eq!(health.status, ComponentStatus::Degraded);
    assert_eq!(
        health.components[components::PREDICTION_ENGINE].status,
        ComponentStatus::Degraded
    );
    // Degraded components keep the service ready
    assert!(service.readiness().await.ready);

    *engine.output.lock().unwrap() = Some(prediction(0.9));
    service.get_prediction("match-9").await.unwrap();
    assert_eq!(service.health().await.status, ComponentStatus::Healthy);

    service.shutdown("test complete").await.unwrap();
}

#[tokio::test]
async fn test_manual_update_promotes_candidate() {
    let engine = Arc::new(FixedEngine::new(Some(prediction(0.8))));
    let clock = Arc::new(ManualClock::new(at(10, 12, 0)));
    let service = start_service(&ServiceConfig::default(), engine, clock).await;

    match service.scheduler().trigger_now().await {
        CycleOutcome::Promoted { from, to, .. } => {
            assert_eq!(from.to_string(), "1.0");
            assert_eq!(to.to_string(), "1.1");
        }
        other => panic!("expected promotion, got {:?}", other),
    }

    let active = service.scheduler().registry().active().await;
    assert_eq!(active.artifact.as_str(), "models/retrained");

    service.shutdown("test complete").await.unwrap();
}

#[tokio::test]
async fn test_scheduled_run_is_recorded_in_ledger_file() {
    let temp_dir = TempDir::new().unwrap();
    let ledger_path = temp_dir.path().join("ledger.json");

    let raw = json!({
        "service_name": "match-predictor",
        "scheduler": { "ledger_path": ledger_path },
    })
    .to_string();
    let config = ServiceConfig::from_builder(
        Config::builder().add_source(File::from_str(&raw, FileFormat::Json)),
    )
    .unwrap();

    let engine = Arc::new(FixedEngine::new(Some(prediction(0.8))));
    let clock = Arc::new(ManualClock::new(at(10, 12, 0)));
    let service = start_service(&config, engine, clock.clone()).await;

    // Let the background loop take its immediate first tick at noon
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    clock.set(at(11, 3, 5));
    let outcome = service.scheduler().tick().await;
    assert!(outcome.is_some_and(|o| o.is_promoted()));

    clock.set(at(11, 3, 40));
    assert!(service.scheduler().tick().await.is_none());

    service.shutdown("test complete").await.unwrap();

    let reopened = RunLedger::open(&ledger_path).unwrap();
    let day = at(11, 3, 5).date_naive();
    assert_eq!(
        reopened.record(),
        RunRecord {
            last_attempt: Some(day),
            last_success: Some(day),
        }
    );
}
