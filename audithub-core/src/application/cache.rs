//! Cache service abstraction shared by the session store, brute-force
//! protection, and the token blacklist

use async_trait::async_trait;
use std::time::Duration;

use super::errors::ApplicationError;

/// Key/value cache with per-entry TTL.
///
/// Values are JSON-serialized. `take` removes and returns an entry in one
/// atomic step, which is what single-use codes and states rely on.
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send;

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync;

    /// Atomic get-and-delete
    async fn take<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send;

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError>;
}
