//! Refresh token persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entities::RefreshToken;
use crate::domain::auth::errors::AuthError;

#[async_trait]
pub trait IRefreshTokenRepository: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError>;

    /// Mark `id` as rotated into `replaced_by`.
    ///
    /// Only succeeds while the token is neither rotated nor revoked, so two
    /// concurrent refreshes with the same token cannot both win. Returns
    /// whether this call performed the rotation.
    async fn mark_rotated(
        &self,
        id: Uuid,
        replaced_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Revoke every live token in the family; returns how many were revoked
    async fn revoke_family(&self, family_id: Uuid, at: DateTime<Utc>) -> Result<u64, AuthError>;
}
