//! Error types for the prediction and model update paths

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the cache or its backing store
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store operation failed for {key}: {cause:#}")]
    Store { key: String, cause: anyhow::Error },

    #[error("failed to encode cache record for {key}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode cache record for {key}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Hard failures of a prediction request
///
/// Validation rejections are not errors; they are served as fallbacks.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction engine failed for match {match_id}: {cause:#}")]
    Engine { match_id: String, cause: anyhow::Error },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("prediction service is shutting down")]
    Unavailable,
}

/// Failures of a single model update cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("training data collection failed: {0:#}")]
    DataCollection(anyhow::Error),

    #[error("evaluation of the active model failed: {0:#}")]
    CurrentEvaluation(anyhow::Error),

    #[error("candidate training failed: {0:#}")]
    Training(anyhow::Error),

    #[error("evaluation of the candidate model failed: {0:#}")]
    CandidateEvaluation(anyhow::Error),

    #[error("{subject} model produced non-finite metrics")]
    MalformedMetrics { subject: &'static str },
}

impl CycleError {
    /// Returns true for data/training failures that only abort the cycle.
    ///
    /// Non-recoverable errors indicate a broken collaborator contract and
    /// panic in debug builds after being logged.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CycleError::MalformedMetrics { .. })
    }
}

/// Failures reading or writing the update run ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger at {path:?} is corrupt")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
