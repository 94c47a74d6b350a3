//! Time-bounded prediction cache
//!
//! Entries carry their own creation time and TTL. Reads compare
//! `created_at + ttl` against the clock and report stale entries as absent
//! without touching them; the only way an entry leaves the store is being
//! overwritten by a later `set` for the same key.

use super::store::KeyValueStore;
use crate::clock::Clock;
use crate::error::CacheError;
use crate::models::Prediction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How long a validated prediction stays servable (6 hours)
pub const DEFAULT_PREDICTION_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Configuration for the prediction cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied by the orchestrator to every cached prediction
    pub ttl: Duration,
    /// Namespace prepended to match ids when building store keys
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_PREDICTION_TTL,
            key_prefix: "prediction".to_string(),
        }
    }
}

/// Record stored for each cached match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Prediction,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    /// Instant from which the entry is stale, `None` if it never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(Duration::from_millis(self.ttl_ms)).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Valid iff `now < created_at + ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |expires_at| now < expires_at)
    }
}

/// Prediction cache with per-entry expiry
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl TtlCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// TTL configured for new entries
    pub fn default_ttl(&self) -> Duration {
        self.config.ttl
    }

    fn store_key(&self, match_id: &str) -> String {
        format!("{}:{}", self.config.key_prefix, match_id)
    }

    /// Fetch the fresh prediction cached for `match_id`, if any
    pub async fn get(&self, match_id: &str) -> Result<Option<Prediction>, CacheError> {
        let Some(entry) = self.entry(match_id).await? else {
            return Ok(None);
        };

        let now = self.clock.now().with_timezone(&Utc);
        if entry.is_valid_at(now) {
            Ok(Some(entry.payload))
        } else {
            debug!(
                match_id = %match_id,
                created_at = %entry.created_at,
                "Cached prediction is stale"
            );
            Ok(None)
        }
    }

    /// Raw stored entry for `match_id`, stale or not
    pub async fn entry(&self, match_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        let key = self.store_key(match_id);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Decode { key, source })
    }

    /// Cache `prediction` for `match_id`, replacing whatever was there
    pub async fn set(
        &self,
        match_id: &str,
        prediction: &Prediction,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = self.store_key(match_id);
        let entry = CacheEntry {
            key: key.clone(),
            payload: prediction.clone(),
            created_at: self.clock.now().with_timezone(&Utc),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };

        let bytes = serde_json::to_vec(&entry).map_err(|source| CacheError::Encode {
            key: key.clone(),
            source,
        })?;
        self.store.set_with_expiry(&key, bytes, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use std::collections::BTreeMap;

    fn sample_prediction(home: f64) -> Prediction {
        Prediction {
            home_score: Some(home),
            away_score: Some(1.0),
            confidence: 0.8,
            probabilities: BTreeMap::from([("home_win".to_string(), 0.6)]),
            features: BTreeMap::new(),
            message: None,
        }
    }

    fn setup() -> (TtlCache, Arc<ManualClock>, Arc<InMemoryStore>) {
        let start = Local.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).earliest().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryStore::new());
        let cache = TtlCache::new(store.clone(), clock.clone(), CacheConfig::default());
        (cache, clock, store)
    }

    #[tokio::test]
    async fn test_hit_before_expiry_miss_after() {
        let (cache, clock, _store) = setup();
        let prediction = sample_prediction(2.0);

        cache
            .set("M1", &prediction, DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();

        clock.advance(chrono::Duration::minutes(5 * 60 + 59));
        assert_eq!(cache.get("M1").await.unwrap(), Some(prediction));

        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(cache.get("M1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_exclusive() {
        let (cache, clock, _store) = setup();
        cache
            .set("M1", &sample_prediction(2.0), DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(6));
        assert!(cache.get("M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_is_kept_until_overwritten() {
        let (cache, clock, store) = setup();
        cache
            .set("M1", &sample_prediction(2.0), DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(7));
        assert!(cache.get("M1").await.unwrap().is_none());
        assert!(store.contains_key("prediction:M1"));
        assert!(cache.entry("M1").await.unwrap().is_some());

        let replacement = sample_prediction(3.0);
        cache
            .set("M1", &replacement, DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();
        assert_eq!(cache.get("M1").await.unwrap(), Some(replacement));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_set_passes_ttl_to_store() {
        let (cache, _clock, store) = setup();
        let ttl = Duration::from_secs(90);
        cache.set("M2", &sample_prediction(1.0), ttl).await.unwrap();

        assert_eq!(store.ttl_of("prediction:M2"), Some(ttl));
        assert_eq!(cache.entry("M2").await.unwrap().unwrap().ttl_ms, 90_000);
    }

    #[tokio::test]
    async fn test_sub_second_ttl_is_honoured() {
        let (cache, clock, _store) = setup();
        cache
            .set("M4", &sample_prediction(2.0), Duration::from_millis(500))
            .await
            .unwrap();

        clock.advance(chrono::Duration::milliseconds(400));
        assert!(cache.get("M4").await.unwrap().is_some());

        clock.advance(chrono::Duration::milliseconds(100));
        assert!(cache.get("M4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_float_payload_survives_roundtrip() {
        let (cache, _clock, _store) = setup();
        let mut prediction = sample_prediction(2.0);
        prediction
            .probabilities
            .insert("home_win".to_string(), 0.9856906946328695);
        prediction.confidence = 0.9856906946328695;

        cache
            .set("M5", &prediction, DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();
        let cached = cache.get("M5").await.unwrap().unwrap();

        assert_eq!(
            cached.probabilities["home_win"].to_bits(),
            0.9856906946328695_f64.to_bits()
        );
        assert_eq!(cached.confidence.to_bits(), prediction.confidence.to_bits());
        assert_eq!(cached, prediction);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_decode_error() {
        let (cache, _clock, store) = setup();
        store
            .set_with_expiry("prediction:M3", b"not json".to_vec(), DEFAULT_PREDICTION_TTL)
            .await
            .unwrap();

        let err = cache.get("M3").await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Store {
                key: key.to_string(),
                cause: anyhow::anyhow!("connection reset"),
            })
        }

        async fn set_with_expiry(
            &self,
            key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Store {
                key: key.to_string(),
                cause: anyhow::anyhow!("connection reset"),
            })
        }
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let clock = Arc::new(ManualClock::new(Local::now()));
        let cache = TtlCache::new(Arc::new(BrokenStore), clock, CacheConfig::default());

        tokio_test::assert_err!(cache.get("M1").await);
        tokio_test::assert_err!(
            cache
                .set("M1", &sample_prediction(1.0), DEFAULT_PREDICTION_TTL)
                .await
        );
    }
}
