//! Component health tracking for the prediction service
//!
//! The orchestrator and the update scheduler report into a shared
//! [`HealthRegistry`]; the embedding request layer decides how to expose it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing intermittently but still serving
    Degraded,
    /// Broken contract or state that needs an operator; blocks readiness
    Unhealthy,
}

/// Last reported health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered this status
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

/// Overall health snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Snapshot whose overall status is the worst component status
    pub fn from_components(components: BTreeMap<String, ComponentHealth>) -> Self {
        let status = components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        Self { status, components }
    }

    fn unhealthy_components(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, health)| health.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Readiness snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const PREDICTION_ENGINE: &str = "prediction_engine";
    pub const CACHE: &str = "cache";
    pub const MODEL_UPDATER: &str = "model_updater";

    pub const ALL: [&str; 3] = [PREDICTION_ENGINE, CACHE, MODEL_UPDATER];
}

/// Shared registry of component health, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<AtomicBool>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every service component registered as healthy
    pub async fn for_service() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.recover(name).await;
        }
        registry
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Mark a component healthy, taking the write lock only when its status
    /// actually changes so `since` keeps the start of the healthy streak
    pub async fn recover(&self, name: &str) {
        if self.status_of(name).await != Some(ComponentStatus::Healthy) {
            self.report(name, ComponentStatus::Healthy, None).await;
        }
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        self.components
            .read()
            .await
            .get(name)
            .map(|health| health.status)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse::from_components(self.components.read().await.clone())
    }

    /// Ready once started and while no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.ready.load(Ordering::SeqCst) {
            return ReadinessResponse {
                ready: false,
                reason: Some("Service not started or shutting down".to_string()),
            };
        }

        let health = self.health().await;
        let unhealthy = health.unhealthy_components();
        if !unhealthy.is_empty() {
            return ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", unhealthy.join(", "))),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_registry_starts_healthy() {
        let registry = HealthRegistry::for_service().await;
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 3);
        assert!(health.components.contains_key(components::MODEL_UPDATER));
    }

    #[tokio::test]
    async fn test_degraded_component_degrades_overall() {
        let registry = HealthRegistry::for_service().await;
        registry
            .set_degraded(components::PREDICTION_ENGINE, "timeouts")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert_eq!(
            registry.status_of(components::PREDICTION_ENGINE).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_unhealthy_wins_over_degraded() {
        let registry = HealthRegistry::for_service().await;
        registry.set_degraded(components::CACHE, "slow").await;
        registry
            .set_unhealthy(components::MODEL_UPDATER, "non-finite metrics")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_recover_keeps_healthy_since() {
        let registry = HealthRegistry::for_service().await;
        let before = registry.health().await.components[components::CACHE].since;
        registry.recover(components::CACHE).await;
        assert_eq!(
            registry.health().await.components[components::CACHE].since,
            before
        );

        registry.set_degraded(components::CACHE, "slow").await;
        registry.recover(components::CACHE).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_names_unhealthy_components() {
        let registry = HealthRegistry::for_service().await;
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true);
        assert!(registry.readiness().await.ready);

        registry.set_degraded(components::CACHE, "slow").await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(components::MODEL_UPDATER, "non-finite metrics")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Unhealthy components: model_updater")
        );
    }
}
