//! Key-value cache boundary for sentiment results.
//!
//! The engine consumes this as an external collaborator: `get`/`set`/`setex`/
//! `keys`. Eviction beyond TTL expiry is the cache's own concern, never the
//! engine's.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::error::SentimentError;

#[async_trait]
pub trait SentimentCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SentimentError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), SentimentError>;

    /// Stores `value` with a TTL in seconds.
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), SentimentError>;

    /// Lists keys matching a glob pattern. Only trailing-`*` prefix patterns
    /// (and exact keys) are supported, which is all the engine uses.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SentimentError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory cache with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

#[async_trait]
impl SentimentCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SentimentError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SentimentError> {
        self.entries.write().await.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), SentimentError> {
        self.entries.write().await.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SentimentError> {
        let entries = self.entries.read().await;
        let matches = |key: &str| {
            pattern
                .strip_suffix('*')
                .map_or(key == pattern, |prefix| key.starts_with(prefix))
        };
        Ok(entries
            .iter()
            .filter(|(key, entry)| matches(key) && !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new();
        cache.set("sentiment:a", "{}").await.unwrap();
        assert_eq!(cache.get("sentiment:a").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.get("sentiment:b").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn setex_entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.setex("sentiment:a", 60, "{}").await.unwrap();
        assert!(cache.get("sentiment:a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("sentiment:a").await.unwrap(), None);
        assert!(cache.keys("sentiment:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_filters_by_prefix_glob() {
        let cache = MemoryCache::new();
        cache.set("sentiment:a", "1").await.unwrap();
        cache.set("sentiment:b", "2").await.unwrap();
        cache.set("themes:a", "3").await.unwrap();

        let mut keys = cache.keys("sentiment:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["sentiment:a", "sentiment:b"]);

        assert_eq!(cache.keys("themes:a").await.unwrap(), vec!["themes:a"]);
    }
}
