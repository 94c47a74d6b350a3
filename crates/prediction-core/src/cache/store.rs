//! Key-value stores backing the prediction cache

use crate::error::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::trace;

/// Byte-oriented key-value store with per-key expiry hints
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Overwrite `key` with `value`, passing the TTL down to the store
    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    ttl: Duration,
}

/// In-process store on a sharded concurrent map.
///
/// Writes to different keys never contend on the same lock and a write to
/// an existing key replaces it atomically. Entries are never evicted; the
/// TTL is only recorded.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, stale entries included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// TTL recorded with the last write of `key`
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.get(key).map(|entry| entry.ttl)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.bytes.clone()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        trace!(key = %key, bytes = value.len(), ttl_ms = ttl.as_millis() as u64, "Storing value");
        self.entries
            .insert(key.to_string(), StoredValue { bytes: value, ttl });
        Ok(())
    }
}
