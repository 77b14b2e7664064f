//! In-process cache implementation using moka

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::time::{Duration, Instant};

use super::codec;
use crate::application::cache::CacheService;
use crate::application::errors::ApplicationError;

#[derive(Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    ttl: Duration,
}

/// Evicts each entry after its own TTL
struct PerEntryExpiry;

impl Expiry<String, StoredValue> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Single-instance cache; pending authorization state does not survive a
/// restart and is not shared between replicas.
pub struct MemoryCache {
    cache: Cache<String, StoredValue>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryExpiry)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self.cache.get(key).await {
            Some(stored) => codec::decode(&stored.bytes),
            None => Ok(None),
        }
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync,
    {
        let bytes = codec::encode(value, ttl.as_secs(), None)?;
        self.cache
            .insert(key.to_string(), StoredValue { bytes, ttl })
            .await;
        Ok(())
    }

    async fn take<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self.cache.remove(key).await {
            Some(stored) => codec::decode(&stored.bytes),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let cache = MemoryCache::new(100);
        cache
            .set("k", &serde_json::json!({"a": 1}), Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<serde_json::Value> = cache.get("k").await.unwrap();
        assert_eq!(value, Some(serde_json::json!({"a": 1})));

        cache.invalidate("k").await.unwrap();
        assert!(cache.get::<serde_json::Value>("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let cache = MemoryCache::new(100);
        cache.set("code", &"abc", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.take::<String>("code").await.unwrap().as_deref(), Some("abc"));
        assert!(cache.take::<String>("code").await.unwrap().is_none());
        assert!(cache.get::<String>("code").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_served() {
        let cache = MemoryCache::new(100);
        cache.set("k", &1u8, Duration::from_secs(0)).await.unwrap();
        assert!(cache.get::<u8>("k").await.unwrap().is_none());
    }
}
