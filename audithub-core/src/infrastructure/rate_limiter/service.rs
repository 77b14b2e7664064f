//! Rate Limiter Service
//!
//! Coordinates the three layers:
//! - token bucket per tier for API requests
//! - sliding window lockout on credential endpoints
//! - sliding window per user for community actions

use super::sliding_window::{ActionLimitResult, AuthRateLimitResult, SlidingWindowLimiter};
use super::storage::{DragonflyRateLimitStorage, InMemoryRateLimitStorage, RateLimitStorage};
use super::token_bucket::TokenBucket;
use super::types::{AuthEndpoint, AuthTier, RateLimitKey, RateLimitResult, RequestCost};
use crate::application::community::ActionRateLimiter;
use crate::application::errors::ApplicationError;
use crate::config::{RateLimitStorageBackend, TieredRateLimitConfig};
use crate::domain::community::value_objects::CommunityAction;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RateLimiterService {
    token_bucket: TokenBucket,
    auth_limiter: SlidingWindowLimiter,
    action_limiter: SlidingWindowLimiter,
    storage: Arc<dyn RateLimitStorage>,
    config: TieredRateLimitConfig,
}

impl RateLimiterService {
    /// Connects to Dragonfly when configured, falling back to in-memory
    /// storage if the connection fails.
    pub async fn new_with_url(config: TieredRateLimitConfig, dragonfly_url: &str) -> Self {
        let storage: Arc<dyn RateLimitStorage> = match config.storage_backend {
            RateLimitStorageBackend::Dragonfly => {
                match DragonflyRateLimitStorage::new(dragonfly_url).await {
                    Ok(storage) => {
                        info!("Rate limiter using Dragonfly storage backend");
                        Arc::new(storage)
                    }
                    Err(e) => {
                        warn!(
                            "Failed to connect to Dragonfly for rate limiting, falling back to in-memory: {}",
                            e
                        );
                        Arc::new(InMemoryRateLimitStorage::new())
                    }
                }
            }
            RateLimitStorageBackend::Memory => {
                info!("Rate limiter using in-memory storage backend");
                Arc::new(InMemoryRateLimitStorage::new())
            }
        };

        Self::with_storage(storage, config)
    }

    pub fn with_storage(storage: Arc<dyn RateLimitStorage>, config: TieredRateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(Arc::clone(&storage), "ratelimit:api"),
            auth_limiter: SlidingWindowLimiter::new(Arc::clone(&storage), "ratelimit:auth"),
            action_limiter: SlidingWindowLimiter::new(Arc::clone(&storage), "ratelimit:community"),
            storage,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Authenticated requests draw from the user's bucket, everything else
    /// from the client IP's.
    pub async fn check_api_limit(
        &self,
        ip: &str,
        user_id: Option<Uuid>,
        cost: RequestCost,
    ) -> RateLimitResult {
        if !self.config.enabled {
            return RateLimitResult::allowed(u32::MAX, u32::MAX, 0, AuthTier::Anonymous);
        }

        let (tier, key, tier_config) = match user_id {
            Some(user) => (
                AuthTier::Authenticated,
                RateLimitKey::UserId(user),
                &self.config.tiers.authenticated,
            ),
            None => (
                AuthTier::Anonymous,
                RateLimitKey::Ip(ip.to_string()),
                &self.config.tiers.anonymous,
            ),
        };

        self.token_bucket
            .check(&key, tier, tier_config, cost.value(&self.config.costs))
            .await
    }

    pub async fn check_auth_limit(&self, ip: &str, endpoint: AuthEndpoint) -> AuthRateLimitResult {
        if !self.config.enabled || !self.config.auth_protection.enabled {
            return AuthRateLimitResult::allowed(u32::MAX, endpoint);
        }

        self.auth_limiter
            .check(ip, endpoint, &self.config.auth_protection)
            .await
    }

    pub async fn check_action_limit(
        &self,
        user_id: Uuid,
        action: CommunityAction,
        trusted: bool,
    ) -> ActionLimitResult {
        if !self.config.enabled {
            return ActionLimitResult::Allowed {
                remaining: u32::MAX,
            };
        }

        let limits = match action {
            CommunityAction::Comment => &self.config.actions.comment,
            CommunityAction::Vote => &self.config.actions.vote,
            CommunityAction::Rating => &self.config.actions.rating,
        };
        let bonus = if trusted {
            self.config.actions.trusted_bonus_percent
        } else {
            0
        };

        self.action_limiter
            .check_action(user_id, action, limits, bonus)
            .await
    }

    /// Periodically evicts expired in-memory state until `shutdown` fires
    pub fn start_cleanup_task(self: Arc<Self>, shutdown: CancellationToken) {
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Rate limiter cleanup task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.storage.cleanup().await;
                    }
                }
            }
        });
    }

    pub fn config(&self) -> &TieredRateLimitConfig {
        &self.config
    }
}

#[async_trait]
impl ActionRateLimiter for RateLimiterService {
    async fn check(
        &self,
        user_id: Uuid,
        action: CommunityAction,
        trusted: bool,
    ) -> Result<(), ApplicationError> {
        match self.check_action_limit(user_id, action, trusted).await {
            ActionLimitResult::Allowed { .. } => Ok(()),
            ActionLimitResult::Blocked { retry_after } => {
                Err(ApplicationError::RateLimited { retry_after })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionLimitConfig, TierLimitConfig};

    fn test_config() -> TieredRateLimitConfig {
        let mut config = TieredRateLimitConfig {
            enabled: true,
            storage_backend: RateLimitStorageBackend::Memory,
            ..TieredRateLimitConfig::default()
        };
        config.tiers.anonymous = TierLimitConfig {
            requests_per_minute: 20,
            requests_per_hour: 100,
            burst_size: 5,
        };
        config.actions.vote = ActionLimitConfig {
            per_minute: 1,
            per_hour: 10,
        };
        config
    }

    fn service(config: TieredRateLimitConfig) -> RateLimiterService {
        RateLimiterService::with_storage(Arc::new(InMemoryRateLimitStorage::new()), config)
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled() {
        let mut config = test_config();
        config.enabled = false;
        let service = service(config);

        let result = service
            .check_api_limit("192.168.1.1", None, RequestCost::Get)
            .await;
        assert!(result.allowed);
        assert_eq!(result.limit, u32::MAX);
    }

    #[tokio::test]
    async fn test_tier_selection() {
        let service = service(test_config());

        let anon = service
            .check_api_limit("192.168.1.1", None, RequestCost::Get)
            .await;
        assert_eq!(anon.tier, AuthTier::Anonymous);
        assert_eq!(anon.limit, 20);

        let user = service
            .check_api_limit("192.168.1.1", Some(Uuid::new_v4()), RequestCost::Get)
            .await;
        assert_eq!(user.tier, AuthTier::Authenticated);
    }

    #[tokio::test]
    async fn test_write_costs_more_than_read() {
        let service = service(test_config());
        let first = service
            .check_api_limit("10.0.0.1", None, RequestCost::Get)
            .await;
        let second = service
            .check_api_limit("10.0.0.1", None, RequestCost::Write)
            .await;
        assert_eq!(first.remaining - second.remaining, 2);
    }

    #[tokio::test]
    async fn test_action_limit_maps_to_rate_limited() {
        let service = service(test_config());
        let user = Uuid::new_v4();

        assert!(ActionRateLimiter::check(&service, user, CommunityAction::Vote, false).await.is_ok());
        match ActionRateLimiter::check(&service, user, CommunityAction::Vote, false).await {
            Err(ApplicationError::RateLimited { retry_after }) => assert!(retry_after > 0),
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Comment budget is separate
        assert!(ActionRateLimiter::check(&service, user, CommunityAction::Comment, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_trusted_users_get_bonus_capacity() {
        let service = service(test_config());
        let user = Uuid::new_v4();
        assert!(ActionRateLimiter::check(&service, user, CommunityAction::Vote, true).await.is_ok());
        assert!(ActionRateLimiter::check(&service, user, CommunityAction::Vote, true).await.is_ok());
        assert!(ActionRateLimiter::check(&service, user, CommunityAction::Vote, true).await.is_err());
    }
}
