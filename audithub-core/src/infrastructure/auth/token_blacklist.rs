//! Token blacklist for early access token revocation
//!
//! Access tokens are stateless, so revocation is recorded in the cache: either
//! a single `jti`, or a per-user cut-off that invalidates every token issued
//! at or before it. `iat` has one-second resolution, so the cut-off second
//! itself counts as revoked. Entries live only as long as the tokens they cover.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::application::cache::CacheService;
use crate::application::errors::ApplicationError;
use crate::domain::auth::value_objects::UserId;

#[async_trait]
pub trait TokenBlacklistService: Send + Sync {
    /// Revoke one access token until `ttl` (its remaining lifetime) passes
    async fn blacklist_token(&self, token_jti: &str, ttl: Duration)
    -> Result<(), ApplicationError>;

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, ApplicationError>;

    /// Invalidate every token issued to the user up to and including now
    async fn revoke_all_user_tokens(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<(), ApplicationError>;

    /// Whether a token with this `iat` falls at or before the user's cut-off
    async fn are_user_tokens_revoked(
        &self,
        user_id: &UserId,
        token_iat: i64,
    ) -> Result<bool, ApplicationError>;
}

pub struct CacheTokenBlacklistService<C: CacheService> {
    cache: Arc<C>,
}

impl<C: CacheService> CacheTokenBlacklistService<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    fn token_key(token_jti: &str) -> String {
        format!("auth:blacklist:token:{}", token_jti)
    }

    fn user_revocation_key(user_id: &UserId) -> String {
        format!("auth:blacklist:user:{}", user_id)
    }
}

#[async_trait]
impl<C: CacheService> TokenBlacklistService for CacheTokenBlacklistService<C> {
    async fn blacklist_token(
        &self,
        token_jti: &str,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        let key = Self::token_key(token_jti);
        let timestamp = chrono::Utc::now().timestamp();
        self.cache.set(&key, &timestamp, ttl).await?;

        tracing::debug!(token_jti = %token_jti, "Token added to blacklist");
        Ok(())
    }

    async fn is_blacklisted(&self, token_jti: &str) -> Result<bool, ApplicationError> {
        let key = Self::token_key(token_jti);
        let result: Option<i64> = self.cache.get(&key).await?;
        Ok(result.is_some())
    }

    async fn revoke_all_user_tokens(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        let key = Self::user_revocation_key(user_id);
        let timestamp = chrono::Utc::now().timestamp();
        self.cache.set(&key, &timestamp, ttl).await?;

        tracing::info!(user_id = %user_id, "All user tokens revoked");
        Ok(())
    }

    async fn are_user_tokens_revoked(
        &self,
        user_id: &UserId,
        token_iat: i64,
    ) -> Result<bool, ApplicationError> {
        let key = Self::user_revocation_key(user_id);
        let revoked_at: Option<i64> = self.cache.get(&key).await?;
        Ok(revoked_at.is_some_and(|revoked_at| token_iat <= revoked_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::MemoryCache;

    fn service() -> CacheTokenBlacklistService<MemoryCache> {
        CacheTokenBlacklistService::new(Arc::new(MemoryCache::new(100)))
    }

    #[test]
    fn test_key_layout() {
        type Svc = CacheTokenBlacklistService<MemoryCache>;
        assert_eq!(Svc::token_key("abc123"), "auth:blacklist:token:abc123");
        assert!(Svc::user_revocation_key(&UserId::generate()).starts_with("auth:blacklist:user:"));
    }

    #[tokio::test]
    async fn test_single_token_blacklist() {
        let service = service();
        assert!(!service.is_blacklisted("jti-1").await.unwrap());
        service
            .blacklist_token("jti-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(service.is_blacklisted("jti-1").await.unwrap());
        assert!(!service.is_blacklisted("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_cut_off_only_hits_older_tokens() {
        let service = service();
        let user = UserId::generate();
        let now = chrono::Utc::now().timestamp();

        assert!(!service.are_user_tokens_revoked(&user, now - 10).await.unwrap());

        service
            .revoke_all_user_tokens(&user, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(service.are_user_tokens_revoked(&user, now - 10).await.unwrap());
        assert!(!service.are_user_tokens_revoked(&user, now + 10).await.unwrap());
        assert!(
            !service
                .are_user_tokens_revoked(&UserId::generate(), now - 10)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_user_cut_off_covers_tokens_from_the_same_second() {
        let service = service();
        let user = UserId::generate();

        service
            .revoke_all_user_tokens(&user, Duration::from_secs(60))
            .await
            .unwrap();
        let revoked_at: i64 = service
            .cache
            .get(&CacheTokenBlacklistService::<MemoryCache>::user_revocation_key(&user))
            .await
            .unwrap()
            .unwrap();

        assert!(service.are_user_tokens_revoked(&user, revoked_at).await.unwrap());
        assert!(!service.are_user_tokens_revoked(&user, revoked_at + 1).await.unwrap());
    }
}
