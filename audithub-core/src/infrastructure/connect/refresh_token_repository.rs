//! SQLx implementation of refresh token storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::{errors::AuthError, value_objects::UserId};
use crate::domain::connect::{
    entities::RefreshToken, repositories::IRefreshTokenRepository, value_objects::ScopeSet,
};

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    token_hash: String,
    family_id: Uuid,
    user_id: Uuid,
    client_id: String,
    scopes: String,
    auth_time: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    rotated_at: Option<DateTime<Utc>>,
    replaced_by: Option<Uuid>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<RefreshTokenRow> for RefreshToken {
    type Error = AuthError;

    fn try_from(row: RefreshTokenRow) -> Result<Self, Self::Error> {
        let scopes =
            ScopeSet::parse(&row.scopes).map_err(|message| AuthError::DatabaseError { message })?;
        Ok(RefreshToken {
            id: row.id,
            token_hash: row.token_hash,
            family_id: row.family_id,
            user_id: UserId::from(row.user_id),
            client_id: row.client_id,
            scopes,
            auth_time: row.auth_time,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            rotated_at: row.rotated_at,
            replaced_by: row.replaced_by,
            revoked_at: row.revoked_at,
        })
    }
}

pub struct SqlxRefreshTokenRepository {
    pool: Arc<PgPool>,
}

impl SqlxRefreshTokenRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IRefreshTokenRepository for SqlxRefreshTokenRepository {
    #[tracing::instrument(skip(self, token), fields(family_id = %token.family_id, user_id = %token.user_id))]
    async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, token_hash, family_id, user_id, client_id, scopes,
                                        auth_time, issued_at, expires_at, rotated_at,
                                        replaced_by, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.family_id)
        .bind(token.user_id.as_uuid())
        .bind(&token.client_id)
        .bind(token.scopes.to_string())
        .bind(token.auth_time)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.rotated_at)
        .bind(token.replaced_by)
        .bind(token.revoked_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, token_hash, family_id, user_id, client_id, scopes, auth_time,
                   issued_at, expires_at, rotated_at, replaced_by, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(RefreshToken::try_from).transpose()
    }

    async fn mark_rotated(
        &self,
        id: Uuid,
        replaced_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET rotated_at = $3, replaced_by = $2
            WHERE id = $1 AND rotated_at IS NULL AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(replaced_by)
        .bind(at)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn revoke_family(&self, family_id: Uuid, at: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE family_id = $1 AND revoked_at IS NULL",
        )
        .bind(family_id)
        .bind(at)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
