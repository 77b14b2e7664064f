//! SQLx implementation of the reputation ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::value_objects::UserId;
use crate::domain::community::{
    entities::ReputationEvent, errors::CommunityError, repositories::IReputationRepository,
    value_objects::ReputationEventKind,
};

#[derive(sqlx::FromRow)]
struct ReputationEventRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    points: i32,
    source_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReputationEventRow> for ReputationEvent {
    type Error = CommunityError;

    fn try_from(row: ReputationEventRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<ReputationEventKind>()
            .map_err(|message| CommunityError::DatabaseError { message })?;
        Ok(ReputationEvent {
            id: row.id,
            user_id: UserId::from(row.user_id),
            kind,
            points: row.points,
            source_id: row.source_id,
            created_at: row.created_at,
        })
    }
}

pub struct SqlxReputationRepository {
    pool: Arc<PgPool>,
}

impl SqlxReputationRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IReputationRepository for SqlxReputationRepository {
    #[tracing::instrument(skip(self, event), fields(user_id = %event.user_id, kind = event.kind.as_str(), points = event.points))]
    async fn append(&self, event: &ReputationEvent) -> Result<(), CommunityError> {
        sqlx::query(
            r#"
            INSERT INTO reputation_events (id, user_id, kind, points, source_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.points)
        .bind(event.source_id)
        .bind(event.created_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn total(&self, user_id: &UserId) -> Result<i64, CommunityError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(points)::BIGINT FROM reputation_events WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&*self.pool)
        .await?;
        Ok(total.unwrap_or(0))
    }

    async fn gained_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, CommunityError> {
        let gained: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(points)::BIGINT
            FROM reputation_events
            WHERE user_id = $1 AND created_at >= $2 AND points > 0
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;
        Ok(gained.unwrap_or(0))
    }

    async fn recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ReputationEvent>, CommunityError> {
        let rows = sqlx::query_as::<_, ReputationEventRow>(
            r#"
            SELECT id, user_id, kind, points, source_id, created_at
            FROM reputation_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await?;
        rows.into_iter().map(ReputationEvent::try_from).collect()
    }
}
