//! Per-account brute force protection
//!
//! Tracks failed password logins per identifier (the normalized email) and
//! locks the identifier out with exponential backoff once the attempt budget
//! for the current window is spent.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::application::cache::CacheService;
use crate::application::errors::ApplicationError;
use crate::config::BruteForceSettings;
use crate::domain::auth::errors::AuthError;

/// Runtime form of [`BruteForceSettings`]
#[derive(Debug, Clone)]
pub struct BruteForceConfig {
    pub max_attempts: u32,
    /// Doubled (by `backoff_multiplier`) for every repeated lockout
    pub base_lockout_duration: Duration,
    pub max_lockout_duration: Duration,
    pub attempt_window: Duration,
    pub backoff_multiplier: f64,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self::from(&BruteForceSettings::default())
    }
}

impl From<&BruteForceSettings> for BruteForceConfig {
    fn from(settings: &BruteForceSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_lockout_duration: Duration::from_secs(settings.base_lockout_seconds),
            max_lockout_duration: Duration::from_secs(settings.max_lockout_seconds),
            attempt_window: Duration::from_secs(settings.attempt_window_seconds),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

/// Login attempt tracking data
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoginAttemptData {
    pub failed_attempts: u32,
    /// Survives window resets so repeat offenders back off further
    pub lockout_count: u32,
    pub locked_until: Option<i64>,
    pub window_start: i64,
}

impl Default for LoginAttemptData {
    fn default() -> Self {
        Self {
            failed_attempts: 0,
            lockout_count: 0,
            locked_until: None,
            window_start: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPermission {
    Allowed,
    Locked { retry_after_seconds: u64 },
}

impl LoginPermission {
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            LoginPermission::Allowed => Ok(()),
            LoginPermission::Locked {
                retry_after_seconds,
            } => Err(AuthError::AccountLocked {
                retry_after_seconds,
            }),
        }
    }
}

#[async_trait]
pub trait BruteForceProtection: Send + Sync {
    async fn check_login_allowed(&self, identifier: &str)
    -> Result<LoginPermission, ApplicationError>;

    async fn record_failed_attempt(&self, identifier: &str) -> Result<(), ApplicationError>;

    /// Clears the counter and the lockout history
    async fn record_successful_login(&self, identifier: &str) -> Result<(), ApplicationError>;
}

/// Cache-backed implementation; works across instances with Dragonfly
pub struct CacheBruteForceProtection<C: CacheService> {
    cache: Arc<C>,
    config: BruteForceConfig,
}

impl<C: CacheService> CacheBruteForceProtection<C> {
    pub fn new(cache: Arc<C>, config: BruteForceConfig) -> Self {
        Self { cache, config }
    }

    /// Identifiers are hashed so raw emails never become cache keys
    fn attempt_key(identifier: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = hex::encode(Sha256::digest(identifier.as_bytes()));
        format!("auth:brute_force:{}", hash)
    }

    fn calculate_lockout_duration(&self, lockout_count: u32) -> Duration {
        let multiplier = self
            .config
            .backoff_multiplier
            .powi(lockout_count.saturating_sub(1) as i32);
        let duration_secs = self.config.base_lockout_duration.as_secs_f64() * multiplier;
        let capped_secs = duration_secs.min(self.config.max_lockout_duration.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }
}

#[async_trait]
impl<C: CacheService> BruteForceProtection for CacheBruteForceProtection<C> {
    async fn check_login_allowed(
        &self,
        identifier: &str,
    ) -> Result<LoginPermission, ApplicationError> {
        let key = Self::attempt_key(identifier);
        let data: Option<LoginAttemptData> = self.cache.get(&key).await?;
        let now = chrono::Utc::now().timestamp();

        if let Some(locked_until) = data.and_then(|d| d.locked_until)
            && now < locked_until
        {
            return Ok(LoginPermission::Locked {
                retry_after_seconds: (locked_until - now) as u64,
            });
        }

        Ok(LoginPermission::Allowed)
    }

    async fn record_failed_attempt(&self, identifier: &str) -> Result<(), ApplicationError> {
        let key = Self::attempt_key(identifier);
        let now = chrono::Utc::now().timestamp();

        let mut data: LoginAttemptData = self.cache.get(&key).await?.unwrap_or_default();

        let window_expired =
            (now - data.window_start) > self.config.attempt_window.as_secs() as i64;
        let lockout_over = data.locked_until.is_some_and(|until| now >= until);
        if window_expired || lockout_over {
            data.failed_attempts = 0;
            data.window_start = now;
            data.locked_until = None;
        }

        data.failed_attempts += 1;

        tracing::debug!(
            identifier_hash = %key,
            failed_attempts = data.failed_attempts,
            max_attempts = self.config.max_attempts,
            "Recording failed login attempt"
        );

        if data.failed_attempts >= self.config.max_attempts {
            data.lockout_count += 1;
            let lockout_duration = self.calculate_lockout_duration(data.lockout_count);
            data.locked_until = Some(now + lockout_duration.as_secs() as i64);

            tracing::warn!(
                identifier_hash = %key,
                lockout_count = data.lockout_count,
                lockout_duration_secs = lockout_duration.as_secs(),
                "Account locked due to too many failed attempts"
            );
        }

        let ttl = self.config.max_lockout_duration + self.config.attempt_window;
        self.cache.set(&key, &data, ttl).await?;

        Ok(())
    }

    async fn record_successful_login(&self, identifier: &str) -> Result<(), ApplicationError> {
        let key = Self::attempt_key(identifier);
        self.cache.invalidate(&key).await?;
        tracing::debug!(identifier_hash = %key, "Login attempt data cleared");
        Ok(())
    }
}
