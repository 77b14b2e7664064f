//! Cache-backed storage for in-flight authorization state
//!
//! Everything here is short-lived and single use, so the cache TTL doubles as
//! the expiry. Codes are stored under their SHA-256 so a cache dump does not
//! leak redeemable values.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::application::cache::CacheService;
use crate::application::connect::AuthorizationSessionStore;
use crate::application::errors::ApplicationError;
use crate::domain::connect::entities::{AuthorizationCode, AuthorizationRequest};
use crate::domain::sso::entities::SsoState;

pub struct CacheAuthorizationSessionStore<C: CacheService> {
    cache: Arc<C>,
}

impl<C: CacheService> CacheAuthorizationSessionStore<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    fn request_key(request_id: &str) -> String {
        format!("connect:authorize:{}", request_id)
    }

    fn code_key(code: &str) -> String {
        format!("connect:code:{}", hex::encode(Sha256::digest(code.as_bytes())))
    }

    fn sso_key(state: &str) -> String {
        format!("connect:sso:{}", state)
    }
}

#[async_trait]
impl<C: CacheService> AuthorizationSessionStore for CacheAuthorizationSessionStore<C> {
    async fn save_request(
        &self,
        request: &AuthorizationRequest,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        self.cache
            .set(&Self::request_key(&request.id), request, ttl)
            .await
    }

    async fn find_request(
        &self,
        request_id: &str,
    ) -> Result<Option<AuthorizationRequest>, ApplicationError> {
        self.cache.get(&Self::request_key(request_id)).await
    }

    async fn take_request(
        &self,
        request_id: &str,
    ) -> Result<Option<AuthorizationRequest>, ApplicationError> {
        self.cache.take(&Self::request_key(request_id)).await
    }

    async fn save_code(
        &self,
        code: &str,
        grant: &AuthorizationCode,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        self.cache.set(&Self::code_key(code), grant, ttl).await
    }

    async fn take_code(&self, code: &str) -> Result<Option<AuthorizationCode>, ApplicationError> {
        self.cache.take(&Self::code_key(code)).await
    }

    async fn save_sso_state(
        &self,
        state: &str,
        sso_state: &SsoState,
        ttl: Duration,
    ) -> Result<(), ApplicationError> {
        self.cache.set(&Self::sso_key(state), sso_state, ttl).await
    }

    async fn take_sso_state(&self, state: &str) -> Result<Option<SsoState>, ApplicationError> {
        self.cache.take(&Self::sso_key(state)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth::value_objects::UserId;
    use crate::domain::connect::value_objects::{CodeChallenge, ScopeSet};
    use crate::infrastructure::cache::MemoryCache;

    type Store = CacheAuthorizationSessionStore<MemoryCache>;

    fn store() -> Store {
        CacheAuthorizationSessionStore::new(Arc::new(MemoryCache::new(100)))
    }

    fn grant() -> AuthorizationCode {
        AuthorizationCode {
            user_id: UserId::generate(),
            client_id: "portal".to_string(),
            redirect_uri: "https://portal.test/cb".to_string(),
            scopes: ScopeSet::parse("openid").unwrap(),
            nonce: None,
            code_challenge: CodeChallenge::new("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string())
                .unwrap(),
            auth_time: 0,
            expires_at: i64::MAX,
        }
    }

    #[test]
    fn test_code_key_hides_code() {
        let key = Store::code_key("raw-code");
        assert!(key.starts_with("connect:code:"));
        assert!(!key.contains("raw-code"));
        assert_eq!(key.len(), "connect:code:".len() + 64);
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let store = store();
        store
            .save_code("abc", &grant(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.take_code("abc").await.unwrap().is_some());
        assert!(store.take_code("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_request_does_not_consume() {
        let store = store();
        let request = AuthorizationRequest {
            id: "req-1".to_string(),
            client_id: "portal".to_string(),
            redirect_uri: "https://portal.test/cb".to_string(),
            scopes: ScopeSet::parse("openid").unwrap(),
            state: "s".to_string(),
            nonce: None,
            code_challenge: grant().code_challenge,
            created_at: chrono::Utc::now(),
        };
        store
            .save_request(&request, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(store.find_request("req-1").await.unwrap().is_some());
        assert!(store.take_request("req-1").await.unwrap().is_some());
        assert!(store.find_request("req-1").await.unwrap().is_none());
    }
}
