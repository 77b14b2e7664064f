//! SQLx implementations of comment and vote storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::auth::value_objects::UserId;
use crate::domain::community::{
    entities::{Comment, Vote},
    errors::CommunityError,
    repositories::{ICommentRepository, IVoteRepository},
    value_objects::{CommentId, ContentStatus, ReportId, VoteValue},
};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    report_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    body: String,
    status: String,
    score: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
    type Error = CommunityError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ContentStatus>()
            .map_err(|message| CommunityError::DatabaseError { message })?;
        Ok(Comment {
            id: CommentId::from(row.id),
            report_id: ReportId::from(row.report_id),
            author_id: UserId::from(row.author_id),
            parent_id: row.parent_id.map(CommentId::from),
            body: row.body,
            status,
            score: row.score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COMMENT_COLUMNS: &str =
    "id, report_id, author_id, parent_id, body, status, score, created_at, updated_at";

pub struct SqlxCommentRepository {
    pool: Arc<PgPool>,
}

impl SqlxCommentRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ICommentRepository for SqlxCommentRepository {
    #[tracing::instrument(skip(self, comment), fields(comment_id = %comment.id, report_id = %comment.report_id))]
    async fn create(&self, comment: &Comment) -> Result<(), CommunityError> {
        sqlx::query(
            r#"
            INSERT INTO comments (id, report_id, author_id, parent_id, body, status, score,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(comment.id.as_uuid())
        .bind(comment.report_id.as_uuid())
        .bind(comment.author_id.as_uuid())
        .bind(comment.parent_id.map(|id| id.as_uuid()))
        .bind(&comment.body)
        .bind(comment.status.as_str())
        .bind(comment.score)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &CommentId) -> Result<Option<Comment>, CommunityError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;
        row.map(Comment::try_from).transpose()
    }

    #[tracing::instrument(skip(self, comment), fields(comment_id = %comment.id, status = %comment.status))]
    async fn update(&self, comment: &Comment) -> Result<(), CommunityError> {
        let result = sqlx::query(
            "UPDATE comments SET body = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(comment.id.as_uuid())
        .bind(&comment.body)
        .bind(comment.status.as_str())
        .bind(comment.updated_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CommunityError::NotFound {
                resource: "comment",
                id: comment.id.to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(report_id = %report_id))]
    async fn list_for_report(&self, report_id: &ReportId) -> Result<Vec<Comment>, CommunityError> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE report_id = $1 ORDER BY created_at, id"
        ))
        .bind(report_id.as_uuid())
        .fetch_all(&*self.pool)
        .await?;
        rows.into_iter().map(Comment::try_from).collect()
    }

    async fn adjust_score(&self, id: &CommentId, delta: i32) -> Result<(), CommunityError> {
        sqlx::query("UPDATE comments SET score = score + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(delta)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    comment_id: Uuid,
    voter_id: Uuid,
    value: i16,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = CommunityError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        let value = VoteValue::try_from(row.value)
            .map_err(|message| CommunityError::DatabaseError { message })?;
        Ok(Vote {
            comment_id: CommentId::from(row.comment_id),
            voter_id: UserId::from(row.voter_id),
            value,
            updated_at: row.updated_at,
        })
    }
}

pub struct SqlxVoteRepository {
    pool: Arc<PgPool>,
}

impl SqlxVoteRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IVoteRepository for SqlxVoteRepository {
    async fn find(
        &self,
        comment_id: &CommentId,
        voter_id: &UserId,
    ) -> Result<Option<Vote>, CommunityError> {
        let row = sqlx::query_as::<_, VoteRow>(
            "SELECT comment_id, voter_id, value, updated_at FROM comment_votes WHERE comment_id = $1 AND voter_id = $2",
        )
        .bind(comment_id.as_uuid())
        .bind(voter_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await?;
        row.map(Vote::try_from).transpose()
    }

    #[tracing::instrument(skip(self, vote), fields(comment_id = %vote.comment_id, voter_id = %vote.voter_id))]
    async fn upsert(&self, vote: &Vote) -> Result<(), CommunityError> {
        sqlx::query(
            r#"
            INSERT INTO comment_votes (comment_id, voter_id, value, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (comment_id, voter_id)
            DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(vote.comment_id.as_uuid())
        .bind(vote.voter_id.as_uuid())
        .bind(vote.value.as_i16())
        .bind(vote.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}
