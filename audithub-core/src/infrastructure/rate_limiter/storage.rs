//! Rate limit state storage
//!
//! Dragonfly keeps counters shared across instances; the in-memory backend
//! serves single-instance deployments and tests.

use super::types::{SlidingWindowState, TokenBucketState, current_time_secs};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait RateLimitStorage: Send + Sync {
    async fn get_token_bucket(&self, key: &str) -> Result<Option<TokenBucketState>, String>;

    async fn set_token_bucket(
        &self,
        key: &str,
        state: &TokenBucketState,
        ttl_secs: u64,
    ) -> Result<(), String>;

    async fn get_sliding_window(&self, key: &str) -> Result<Option<SlidingWindowState>, String>;

    async fn set_sliding_window(
        &self,
        key: &str,
        state: &SlidingWindowState,
        ttl_secs: u64,
    ) -> Result<(), String>;

    /// Lockout expiry (unix seconds), stored beside `key` as `{key}:lockout`
    async fn get_lockout(&self, key: &str) -> Result<Option<u64>, String>;

    async fn set_lockout(&self, key: &str, until: u64, ttl_secs: u64) -> Result<(), String>;

    /// Drop expired entries; a no-op where the backend expires keys itself
    async fn cleanup(&self);
}

fn lockout_key(key: &str) -> String {
    format!("{}:lockout", key)
}

pub struct DragonflyRateLimitStorage {
    connection_manager: ConnectionManager,
}

impl DragonflyRateLimitStorage {
    pub async fn new(url: &str) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            format!("Failed to create Redis client: {}", e)
        })?;

        let mut connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create connection manager for rate limiting: {}", e);
            format!("Failed to create connection manager: {}", e)
        })?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection_manager)
            .await
            .map_err(|e| format!("Failed to ping Dragonfly: {}", e))?;

        debug!("Connected to Dragonfly for rate limiting");
        Ok(Self { connection_manager })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, String> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| format!("Redis GET error: {}", e))?;

        value
            .map(|json| serde_json::from_str(&json).map_err(|e| format!("JSON parse error: {}", e)))
            .transpose()
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), String> {
        let json =
            serde_json::to_string(value).map_err(|e| format!("JSON serialize error: {}", e))?;
        let mut conn = self.connection_manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| format!("Redis SET error: {}", e))
    }
}

#[async_trait]
impl RateLimitStorage for DragonflyRateLimitStorage {
    async fn get_token_bucket(&self, key: &str) -> Result<Option<TokenBucketState>, String> {
        self.get_json(key).await
    }

    async fn set_token_bucket(
        &self,
        key: &str,
        state: &TokenBucketState,
        ttl_secs: u64,
    ) -> Result<(), String> {
        self.set_json(key, state, ttl_secs).await
    }

    async fn get_sliding_window(&self, key: &str) -> Result<Option<SlidingWindowState>, String> {
        self.get_json(key).await
    }

    async fn set_sliding_window(
        &self,
        key: &str,
        state: &SlidingWindowState,
        ttl_secs: u64,
    ) -> Result<(), String> {
        self.set_json(key, state, ttl_secs).await
    }

    async fn get_lockout(&self, key: &str) -> Result<Option<u64>, String> {
        self.get_json(&lockout_key(key)).await
    }

    async fn set_lockout(&self, key: &str, until: u64, ttl_secs: u64) -> Result<(), String> {
        self.set_json(&lockout_key(key), &until, ttl_secs).await
    }

    async fn cleanup(&self) {}
}

#[derive(Clone)]
struct MemoryEntry<T: Clone> {
    value: T,
    expires_at: u64,
}

type EntryMap<T> = RwLock<HashMap<String, MemoryEntry<T>>>;

async fn read_live<T: Clone>(map: &EntryMap<T>, key: &str) -> Option<T> {
    let entries = map.read().await;
    entries
        .get(key)
        .filter(|entry| current_time_secs() < entry.expires_at)
        .map(|entry| entry.value.clone())
}

async fn write_entry<T: Clone>(map: &EntryMap<T>, key: &str, value: T, ttl_secs: u64) {
    map.write().await.insert(
        key.to_string(),
        MemoryEntry {
            value,
            expires_at: current_time_secs() + ttl_secs,
        },
    );
}

#[derive(Default)]
pub struct InMemoryRateLimitStorage {
    token_buckets: Arc<EntryMap<TokenBucketState>>,
    sliding_windows: Arc<EntryMap<SlidingWindowState>>,
    lockouts: Arc<EntryMap<u64>>,
}

impl InMemoryRateLimitStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStorage for InMemoryRateLimitStorage {
    async fn get_token_bucket(&self, key: &str) -> Result<Option<TokenBucketState>, String> {
        Ok(read_live(&self.token_buckets, key).await)
    }

    async fn set_token_bucket(
        &self,
        key: &str,
        state: &TokenBucketState,
        ttl_secs: u64,
    ) -> Result<(), String> {
        write_entry(&self.token_buckets, key, state.clone(), ttl_secs).await;
        Ok(())
    }

    async fn get_sliding_window(&self, key: &str) -> Result<Option<SlidingWindowState>, String> {
        Ok(read_live(&self.sliding_windows, key).await)
    }

    async fn set_sliding_window(
        &self,
        key: &str,
        state: &SlidingWindowState,
        ttl_secs: u64,
    ) -> Result<(), String> {
        write_entry(&self.sliding_windows, key, state.clone(), ttl_secs).await;
        Ok(())
    }

    async fn get_lockout(&self, key: &str) -> Result<Option<u64>, String> {
        Ok(read_live(&self.lockouts, &lockout_key(key)).await)
    }

    async fn set_lockout(&self, key: &str, until: u64, ttl_secs: u64) -> Result<(), String> {
        write_entry(&self.lockouts, &lockout_key(key), until, ttl_secs).await;
        Ok(())
    }

    async fn cleanup(&self) {
        let now = current_time_secs();
        self.token_buckets
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
        self.sliding_windows
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
        self.lockouts
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
        debug!("Completed rate limit storage cleanup");
    }
}
