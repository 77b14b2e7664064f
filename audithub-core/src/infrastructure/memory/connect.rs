use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::auth::errors::AuthError;
use crate::domain::connect::{entities::RefreshToken, repositories::IRefreshTokenRepository};

#[derive(Default)]
pub struct InMemoryRefreshTokenRepository {
    tokens: RwLock<HashMap<Uuid, RefreshToken>>,
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<RefreshToken> {
        self.tokens.read().await.values().cloned().collect()
    }

    fn revoke_where(
        tokens: &mut HashMap<Uuid, RefreshToken>,
        at: DateTime<Utc>,
        predicate: impl Fn(&RefreshToken) -> bool,
    ) -> u64 {
        let mut revoked = 0;
        for token in tokens
            .values_mut()
            .filter(|t| t.revoked_at.is_none() && predicate(t))
        {
            token.revoked_at = Some(at);
            revoked += 1;
        }
        revoked
    }
}

#[async_trait]
impl IRefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        self.tokens.write().await.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.values().find(|t| t.token_hash == token_hash).cloned())
    }

    async fn mark_rotated(
        &self,
        id: Uuid,
        replaced_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.rotated_at.is_none() && token.revoked_at.is_none() => {
                token.rotated_at = Some(at);
                token.replaced_by = Some(replaced_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: Uuid, at: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut tokens = self.tokens.write().await;
        Ok(Self::revoke_where(&mut tokens, at, |t| t.family_id == family_id))
    }
}
