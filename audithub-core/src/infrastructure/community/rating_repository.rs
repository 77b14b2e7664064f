//! SQLx implementation of report ratings

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::value_objects::UserId;
use crate::domain::community::{
    entities::Rating,
    errors::CommunityError,
    repositories::IRatingRepository,
    value_objects::{ContentStatus, RatingId, RatingScore, ReportId},
};

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    report_id: Uuid,
    user_id: Uuid,
    score: i16,
    review: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for Rating {
    type Error = CommunityError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| CommunityError::DatabaseError { message };
        let score = u8::try_from(row.score)
            .map_err(|e| e.to_string())
            .and_then(RatingScore::new)
            .map_err(corrupt)?;
        let status = row.status.parse::<ContentStatus>().map_err(corrupt)?;
        Ok(Rating {
            id: RatingId::from(row.id),
            report_id: ReportId::from(row.report_id),
            user_id: UserId::from(row.user_id),
            score,
            review: row.review,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct SqlxRatingRepository {
    pool: Arc<PgPool>,
}

impl SqlxRatingRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IRatingRepository for SqlxRatingRepository {
    async fn find(
        &self,
        report_id: &ReportId,
        user_id: &UserId,
    ) -> Result<Option<Rating>, CommunityError> {
        let row = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT id, report_id, user_id, score, review, status, created_at, updated_at
            FROM ratings
            WHERE report_id = $1 AND user_id = $2
            "#,
        )
        .bind(report_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;
        row.map(Rating::try_from).transpose()
    }

    #[tracing::instrument(skip(self, rating), fields(report_id = %rating.report_id, user_id = %rating.user_id))]
    async fn upsert(&self, rating: &Rating) -> Result<(), CommunityError> {
        sqlx::query(
            r#"
            INSERT INTO ratings (id, report_id, user_id, score, review, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT ratings_report_user_key
            DO UPDATE SET score = EXCLUDED.score, review = EXCLUDED.review,
                          status = EXCLUDED.status, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rating.id.as_uuid())
        .bind(rating.report_id.as_uuid())
        .bind(rating.user_id.as_uuid())
        .bind(rating.score.value() as i16)
        .bind(rating.review.as_deref())
        .bind(rating.status.as_str())
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(report_id = %report_id))]
    async fn distribution(&self, report_id: &ReportId) -> Result<[u64; 5], CommunityError> {
        let rows: Vec<(i16, i64)> = sqlx::query_as(
            r#"
            SELECT score, COUNT(*)
            FROM ratings
            WHERE report_id = $1 AND status = $2
            GROUP BY score
            "#,
        )
        .bind(report_id.as_uuid())
        .bind(ContentStatus::Published.as_str())
        .fetch_all(&*self.pool)
        .await?;

        let mut distribution = [0u64; 5];
        for (score, count) in rows {
            if let Some(slot) = usize::try_from(score - 1)
                .ok()
                .and_then(|i| distribution.get_mut(i))
            {
                *slot = count.max(0) as u64;
            }
        }
        Ok(distribution)
    }
}
