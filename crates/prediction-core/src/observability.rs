//! Structured logging for the prediction service
//!
//! Provides:
//! - Tracing subscriber setup (JSON or human-readable output)
//! - `StructuredLogger`, the event sink for prediction and model update events

use crate::lifecycle::MetricDeltas;
use crate::models::VersionNumber;
use anyhow::Result;
use serde::Deserialize;
use std::fmt::Display;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `info`. Fails if a
/// subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
    }

    Ok(())
}

/// Structured logger for service events
///
/// Every event carries an `event` field and the service name so that log
/// shipping can route on them.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("prediction-core")
    }
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Log a prediction handed back to a caller
    pub fn log_prediction_served(
        &self,
        match_id: &str,
        source: impl Display,
        confidence: f64,
        duration_us: u64,
    ) {
        debug!(
            event = "prediction_served",
            service = %self.service,
            match_id = %match_id,
            source = %source,
            confidence = confidence,
            duration_us = duration_us,
            "Served prediction"
        );
    }

    /// Log a generated prediction that failed validation
    pub fn log_prediction_rejected(&self, match_id: &str, reason: impl Display) {
        warn!(
            event = "prediction_rejected",
            service = %self.service,
            match_id = %match_id,
            reason = %reason,
            "Invalid prediction, serving fallback"
        );
    }

    /// Log a prediction engine failure
    pub fn log_engine_failure(&self, match_id: &str, error: impl Display) {
        warn!(
            event = "prediction_engine_failed",
            service = %self.service,
            match_id = %match_id,
            error = %error,
            "Prediction engine failed"
        );
    }

    /// Log a promoted candidate model
    pub fn log_model_promoted(
        &self,
        old_version: VersionNumber,
        new_version: VersionNumber,
        deltas: &MetricDeltas,
    ) {
        info!(
            event = "model_promoted",
            service = %self.service,
            old_version = %old_version,
            new_version = %new_version,
            accuracy_delta = deltas.accuracy,
            rmse_delta = deltas.rmse,
            log_loss_delta = deltas.log_loss,
            "Candidate model promoted"
        );
    }

    /// Log a candidate that did not clear the promotion gate
    pub fn log_model_rejected(&self, active_version: VersionNumber, deltas: &MetricDeltas) {
        info!(
            event = "model_rejected",
            service = %self.service,
            active_version = %active_version,
            accuracy_delta = deltas.accuracy,
            rmse_delta = deltas.rmse,
            log_loss_delta = deltas.log_loss,
            "Candidate model kept out of production"
        );
    }

    /// Log a failed update cycle
    pub fn log_update_failed(&self, error: impl Display, recoverable: bool) {
        error!(
            event = "model_update_failed",
            service = %self.service,
            error = %error,
            recoverable = recoverable,
            "Model update cycle failed, keeping active model"
        );
    }

    /// Log a trigger that did not start a cycle
    pub fn log_cycle_skipped(&self, reason: &str) {
        info!(
            event = "update_cycle_skipped",
            service = %self.service,
            reason = %reason,
            "Model update cycle skipped"
        );
    }

    /// Log a rollback to a previous model version
    pub fn log_model_rollback(&self, from_version: VersionNumber, to_version: VersionNumber) {
        warn!(
            event = "model_rolled_back",
            service = %self.service,
            from_version = %from_version,
            to_version = %to_version,
            "Rolled back to previous model version"
        );
    }

    pub fn log_startup(&self, version: &str, model_version: VersionNumber) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version = %model_version,
            "Prediction service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Prediction service shutting down"
        );
    }
}
