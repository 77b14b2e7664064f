//! SQLx implementation of the login audit trail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::{
    entities::LoginHistoryEntry,
    errors::AuthError,
    repositories::ILoginHistoryRepository,
    value_objects::{LoginMethod, UserId},
};

#[derive(sqlx::FromRow)]
struct LoginHistoryRow {
    id: Uuid,
    user_id: Option<Uuid>,
    identifier_hash: String,
    method: String,
    success: bool,
    failure_reason: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    client_id: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<LoginHistoryRow> for LoginHistoryEntry {
    type Error = AuthError;

    fn try_from(row: LoginHistoryRow) -> Result<Self, Self::Error> {
        let method = row
            .method
            .parse::<LoginMethod>()
            .map_err(|message| AuthError::DatabaseError { message })?;
        Ok(LoginHistoryEntry {
            id: row.id,
            user_id: row.user_id.map(UserId::from),
            identifier_hash: row.identifier_hash,
            method,
            success: row.success,
            failure_reason: row.failure_reason,
            ip: row.ip,
            user_agent: row.user_agent,
            client_id: row.client_id,
            occurred_at: row.occurred_at,
        })
    }
}

pub struct SqlxLoginHistoryRepository {
    pool: Arc<PgPool>,
}

impl SqlxLoginHistoryRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ILoginHistoryRepository for SqlxLoginHistoryRepository {
    #[tracing::instrument(skip(self, entry), fields(method = %entry.method, success = entry.success))]
    async fn append(&self, entry: &LoginHistoryEntry) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO login_history (id, user_id, identifier_hash, method, success,
                                       failure_reason, ip, user_agent, client_id, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id.map(|id| id.as_uuid()))
        .bind(&entry.identifier_hash)
        .bind(entry.method.as_string())
        .bind(entry.success)
        .bind(entry.failure_reason.as_deref())
        .bind(entry.ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.client_id.as_deref())
        .bind(entry.occurred_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LoginHistoryEntry>, AuthError> {
        let rows = sqlx::query_as::<_, LoginHistoryRow>(
            r#"
            SELECT id, user_id, identifier_hash, method, success, failure_reason,
                   ip, user_agent, client_id, occurred_at
            FROM login_history
            WHERE user_id = $1
            ORDER BY occurred_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(LoginHistoryEntry::try_from).collect()
    }
}
