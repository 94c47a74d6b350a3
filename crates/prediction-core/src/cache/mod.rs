//! Prediction caching
//!
//! A TTL cache layered over a pluggable key-value store. Values are JSON
//! records keyed by `"{prefix}:{match_id}"`.

mod store;
mod ttl;

pub use store::{InMemoryStore, KeyValueStore};
pub use ttl::{CacheConfig, CacheEntry, TtlCache, DEFAULT_PREDICTION_TTL};
