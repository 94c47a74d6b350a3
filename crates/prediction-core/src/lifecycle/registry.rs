//! Active production model and its replaced predecessors
//!
//! The active version lives behind an `Arc` that is swapped under a write
//! lock, so readers always see either the old or the new version in full.

use crate::models::{CandidateModel, ModelMetrics, ModelVersion, VersionNumber};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Configuration for the model registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of replaced versions kept for rollback
    pub versions_to_keep: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            versions_to_keep: 5,
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    active: Arc<ModelVersion>,
    previous: VecDeque<Arc<ModelVersion>>,
    /// Highest version ever issued, so numbers stay monotonic across rollbacks
    highest_issued: VersionNumber,
}

/// Holder of the single active model version
#[derive(Debug)]
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
}

impl ModelRegistry {
    pub fn new(initial: ModelVersion, config: RegistryConfig) -> Self {
        let highest_issued = initial.version;
        Self {
            state: RwLock::new(RegistryState {
                active: Arc::new(initial),
                previous: VecDeque::new(),
                highest_issued,
            }),
            config,
        }
    }

    /// Snapshot of the active version
    pub async fn active(&self) -> Arc<ModelVersion> {
        self.state.read().await.active.clone()
    }

    pub async fn version(&self) -> VersionNumber {
        self.state.read().await.active.version
    }

    /// Replace the active version with `candidate`, issuing the next version
    /// number. Returns the newly active version.
    pub async fn promote(
        &self,
        candidate: CandidateModel,
        metrics: ModelMetrics,
    ) -> Arc<ModelVersion> {
        let mut state = self.state.write().await;

        let promoted = Arc::new(ModelVersion {
            version: state.highest_issued.next(),
            artifact: candidate.artifact,
            metrics,
            promoted_at: Utc::now(),
        });

        let replaced = std::mem::replace(&mut state.active, promoted.clone());
        state.highest_issued = promoted.version;
        state.previous.push_front(replaced);
        state.previous.truncate(self.config.versions_to_keep);

        info!(
            version = %promoted.version,
            artifact = %promoted.artifact,
            "Model version activated"
        );

        promoted
    }

    /// Reactivate the most recently replaced version, discarding the active
    /// one. Returns `None` when there is no history to roll back to.
    pub async fn rollback(&self) -> Option<Arc<ModelVersion>> {
        let mut state = self.state.write().await;

        let Some(restored) = state.previous.pop_front() else {
            warn!("No previous model version available for rollback");
            return None;
        };

        let discarded = std::mem::replace(&mut state.active, restored.clone());
        info!(
            from = %discarded.version,
            to = %restored.version,
            "Rolled back model version"
        );

        Some(restored)
    }

    /// Versions available for rollback, most recent first
    pub async fn rollback_versions(&self) -> Vec<VersionNumber> {
        self.state
            .read()
            .await
            .previous
            .iter()
            .map(|version| version.version)
            .collect()
    }
}
