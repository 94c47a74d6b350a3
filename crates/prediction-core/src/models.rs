//! Core data models for match prediction serving

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Match outcome prediction produced by the prediction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Expected home goals, `None` on a fallback
    pub home_score: Option<f64>,
    /// Expected away goals, `None` on a fallback
    pub away_score: Option<f64>,
    /// Model confidence in the 0-1 range
    pub confidence: f64,
    /// Outcome label to probability
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
    /// Input features kept for audit and validation
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
    /// Explanatory message, set on fallbacks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Prediction {
    /// Sum of all outcome probabilities
    pub fn probability_sum(&self) -> f64 {
        self.probabilities.values().sum()
    }

    /// Returns true if the prediction carries no score at all
    pub fn is_scoreless(&self) -> bool {
        self.home_score.is_none() && self.away_score.is_none()
    }
}

/// Evaluation metrics of a model against a dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub rmse: f64,
    pub log_loss: f64,
}

impl ModelMetrics {
    pub fn new(accuracy: f64, rmse: f64, log_loss: f64) -> Self {
        Self {
            accuracy,
            rmse,
            log_loss,
        }
    }

    /// Returns true if every metric is a finite number
    pub fn is_finite(&self) -> bool {
        self.accuracy.is_finite() && self.rmse.is_finite() && self.log_loss.is_finite()
    }
}

/// Opaque handle to a trained model artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Model version number, stored in tenths so repeated 0.1 steps stay exact
///
/// Serialized as a float (`1.1`) to match how versions are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct VersionNumber(u32);

impl VersionNumber {
    /// Version of the first production model
    pub const INITIAL: VersionNumber = VersionNumber(10);

    pub const fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    pub const fn tenths(self) -> u32 {
        self.0
    }

    /// The version following this one (+0.1)
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl Default for VersionNumber {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl From<VersionNumber> for f64 {
    fn from(version: VersionNumber) -> Self {
        version.as_f64()
    }
}

impl TryFrom<f64> for VersionNumber {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let tenths = (value * 10.0).round();
        if !value.is_finite() || tenths < 0.0 || tenths > f64::from(u32::MAX) {
            return Err(format!("invalid model version {}", value));
        }
        if (value * 10.0 - tenths).abs() > 1e-6 {
            return Err(format!("model version {} is not a multiple of 0.1", value));
        }
        Ok(Self(tenths as u32))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Training data handle returned by the model trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub samples: usize,
    pub collected_at: DateTime<Utc>,
}

/// Freshly trained model that has not been promoted yet
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateModel {
    pub artifact: ArtifactRef,
    pub trained_at: DateTime<Utc>,
}

/// A model version as held by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: VersionNumber,
    pub artifact: ArtifactRef,
    pub metrics: ModelMetrics,
    pub promoted_at: DateTime<Utc>,
}

impl ModelVersion {
    /// First production model, at version 1.0
    pub fn initial(artifact: ArtifactRef, metrics: ModelMetrics) -> Self {
        Self {
            version: VersionNumber::INITIAL,
            artifact,
            metrics,
            promoted_at: Utc::now(),
        }
    }
}
