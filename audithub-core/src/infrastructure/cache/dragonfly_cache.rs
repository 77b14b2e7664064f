//! Dragonfly database cache implementation
//!
//! Redis-compatible cache backed by Dragonfly. Required whenever more than one
//! instance serves the authorization endpoints, since pending requests, codes,
//! and SSO states must be visible to whichever instance handles the next step.
// cspell:ignore Dragonfly GETDEL

use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, error};

use super::codec;
use crate::application::cache::CacheService;
use crate::application::errors::ApplicationError;

pub struct DragonflyCache {
    connection_manager: ConnectionManager,
    compression_threshold: Option<u64>,
}

impl DragonflyCache {
    /// Connect and verify the server answers PING.
    ///
    /// `compression_threshold_bytes` applies only when `enable_compression` is set.
    pub async fn new(
        url: &str,
        connect_timeout: Duration,
        enable_compression: bool,
        compression_threshold_bytes: u64,
    ) -> Result<Self, ApplicationError> {
        let client = Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            ApplicationError::cache_backend(format!("Invalid Dragonfly URL: {}", e))
        })?;

        let connection_manager =
            tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    ApplicationError::cache_backend(format!(
                        "Timed out connecting to the Dragonfly database after {:?}",
                        connect_timeout
                    ))
                })?
                .map_err(|e| {
                    error!("Failed to create connection manager: {}", e);
                    ApplicationError::cache_backend(format!(
                        "Failed to establish connection to the Dragonfly database: {}",
                        e
                    ))
                })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                error!("Failed to ping the Dragonfly database: {}", e);
                ApplicationError::cache_backend(format!(
                    "Failed to ping the Dragonfly database: {}",
                    e
                ))
            })?;

        debug!("Connected to the Dragonfly database");

        Ok(Self {
            connection_manager,
            compression_threshold: enable_compression.then_some(compression_threshold_bytes),
        })
    }

    fn command_error(command: &str, key: &str, e: redis::RedisError) -> ApplicationError {
        error!(key = %key, "Redis {} failed: {}", command, e);
        ApplicationError::cache_backend(format!("Redis {} error: {}", command, e))
    }
}

#[async_trait]
impl CacheService for DragonflyCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let mut conn = self.connection_manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("GET", key, e))?;

        match value {
            Some(bytes) => codec::decode(&bytes),
            None => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync,
    {
        let ttl_seconds = ttl.as_secs();
        if ttl_seconds == 0 {
            // EX 0 is rejected by the server; a zero TTL means "do not keep"
            return self.invalidate(key).await;
        }

        let bytes = codec::encode(value, ttl_seconds, self.compression_threshold)?;
        let mut conn = self.connection_manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(bytes)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Self::command_error("SET", key, e))?;

        debug!(key = %key, ttl_seconds, "Cached entry");
        Ok(())
    }

    async fn take<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let mut conn = self.connection_manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("GETDEL", key, e))?;

        match value {
            Some(bytes) => codec::decode(&bytes),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        let mut conn = self.connection_manager.clone();
        let deleted: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("DEL", key, e))?;

        debug!(key = %key, deleted, "Invalidated cache key");
        Ok(())
    }
}
