//! Cache service selected from configuration

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{DragonflyCache, MemoryCache};
use crate::application::cache::CacheService;
use crate::application::errors::ApplicationError;
use crate::config::{CacheBackend, CacheConfig};

/// The configured cache backend behind one concrete type, so generic
/// consumers such as `CacheBruteForceProtection<C>` need a single
/// instantiation.
pub enum CacheServiceImpl {
    Dragonfly(DragonflyCache),
    Memory(MemoryCache),
}

impl CacheServiceImpl {
    pub async fn from_config(config: &CacheConfig) -> Result<Self, ApplicationError> {
        match config.backend {
            CacheBackend::Dragonfly => {
                let cache = DragonflyCache::new(
                    &config.dragonfly_url,
                    Duration::from_secs(config.dragonfly_connection_timeout_seconds),
                    config.enable_cache_compression,
                    config.compression_threshold_bytes,
                )
                .await?;
                info!("Cache backend: Dragonfly");
                Ok(CacheServiceImpl::Dragonfly(cache))
            }
            CacheBackend::Memory => {
                info!(
                    max_entries = config.memory_max_entries,
                    "Cache backend: in-process memory"
                );
                Ok(CacheServiceImpl::Memory(MemoryCache::new(
                    config.memory_max_entries,
                )))
            }
        }
    }

    pub fn memory(max_entries: u64) -> Self {
        CacheServiceImpl::Memory(MemoryCache::new(max_entries))
    }
}

#[async_trait]
impl CacheService for CacheServiceImpl {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self {
            CacheServiceImpl::Dragonfly(cache) => cache.get(key).await,
            CacheServiceImpl::Memory(cache) => cache.get(key).await,
        }
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync,
    {
        match self {
            CacheServiceImpl::Dragonfly(cache) => cache.set(key, value, ttl).await,
            CacheServiceImpl::Memory(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn take<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self {
            CacheServiceImpl::Dragonfly(cache) => cache.take(key).await,
            CacheServiceImpl::Memory(cache) => cache.take(key).await,
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        match self {
            CacheServiceImpl::Dragonfly(cache) => cache.invalidate(key).await,
            CacheServiceImpl::Memory(cache) => cache.invalidate(key).await,
        }
    }
}
