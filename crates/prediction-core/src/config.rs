//! Service configuration

use crate::cache::{CacheConfig, DEFAULT_PREDICTION_TTL};
use crate::lifecycle::{
    RegistryConfig, RetryPolicy, SchedulerConfig, DEFAULT_CHECK_INTERVAL, DEFAULT_TRIGGER_HOUR,
};
use crate::observability::LogFormat;
use crate::predictor::{OrchestratorConfig, DEFAULT_MAX_CONCURRENT_GENERATIONS};
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "PREDICTOR_CONFIG";

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name attached to every structured log event
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_concurrent_generations")]
    pub max_concurrent_generations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Local hour (0-23) of the daily update
    #[serde(default = "default_trigger_hour")]
    pub trigger_hour: u32,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Where the run ledger is persisted; in-memory when unset
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_versions_to_keep")]
    pub versions_to_keep: usize,
}

fn default_service_name() -> String {
    "prediction-core".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_PREDICTION_TTL.as_secs()
}

fn default_key_prefix() -> String {
    "prediction".to_string()
}

fn default_max_concurrent_generations() -> usize {
    DEFAULT_MAX_CONCURRENT_GENERATIONS
}

fn default_trigger_hour() -> u32 {
    DEFAULT_TRIGGER_HOUR
}

fn default_check_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL.as_secs()
}

fn default_versions_to_keep() -> usize {
    5
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_generations: default_max_concurrent_generations(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            trigger_hour: default_trigger_hour(),
            check_interval_secs: default_check_interval_secs(),
            retry_policy: RetryPolicy::default(),
            ledger_path: None,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            versions_to_keep: default_versions_to_keep(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_format: LogFormat::default(),
            cache: CacheSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            scheduler: SchedulerSettings::default(),
            registry: RegistrySettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional `PREDICTOR_CONFIG` file, then
    /// `PREDICTOR_*` environment variables (`__` separates nested keys,
    /// e.g. `PREDICTOR_SCHEDULER__TRIGGER_HOUR=4`).
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PREDICTOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    /// Build from an already assembled set of sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to read configuration")?;
        let parsed: Self = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be positive");
        }
        if self.orchestrator.max_concurrent_generations == 0 {
            anyhow::bail!("orchestrator.max_concurrent_generations must be at least 1");
        }
        if self.orchestrator.max_concurrent_generations > Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "orchestrator.max_concurrent_generations must be at most {}",
                Semaphore::MAX_PERMITS
            );
        }
        if self.scheduler.trigger_hour > 23 {
            anyhow::bail!(
                "scheduler.trigger_hour must be between 0 and 23, got {}",
                self.scheduler.trigger_hour
            );
        }
        if self.scheduler.check_interval_secs == 0 {
            anyhow::bail!("scheduler.check_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            key_prefix: self.cache.key_prefix.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_generations: self.orchestrator.max_concurrent_generations,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            trigger_hour: self.scheduler.trigger_hour,
            check_interval: Duration::from_secs(self.scheduler.check_interval_secs),
            retry_policy: self.scheduler.retry_policy,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            versions_to_keep: self.registry.versions_to_keep,
        }
    }
}
