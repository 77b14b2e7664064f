//! Community repository traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entities::{Comment, Rating, ReputationEvent, Vote};
use super::errors::CommunityError;
use super::value_objects::{CommentId, ReportId};
use crate::domain::auth::value_objects::UserId;

#[async_trait]
pub trait ICommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<(), CommunityError>;

    async fn find_by_id(&self, id: &CommentId) -> Result<Option<Comment>, CommunityError>;

    async fn update(&self, comment: &Comment) -> Result<(), CommunityError>;

    /// Every comment on the report regardless of status, oldest first
    async fn list_for_report(&self, report_id: &ReportId) -> Result<Vec<Comment>, CommunityError>;

    /// Atomically add `delta` to the comment score
    async fn adjust_score(&self, id: &CommentId, delta: i32) -> Result<(), CommunityError>;
}

#[async_trait]
pub trait IVoteRepository: Send + Sync {
    async fn find(
        &self,
        comment_id: &CommentId,
        voter_id: &UserId,
    ) -> Result<Option<Vote>, CommunityError>;

    async fn upsert(&self, vote: &Vote) -> Result<(), CommunityError>;
}

#[async_trait]
pub trait IRatingRepository: Send + Sync {
    async fn find(
        &self,
        report_id: &ReportId,
        user_id: &UserId,
    ) -> Result<Option<Rating>, CommunityError>;

    /// Insert or replace the (report, user) rating
    async fn upsert(&self, rating: &Rating) -> Result<(), CommunityError>;

    /// Published rating counts for 1..=5 stars
    async fn distribution(&self, report_id: &ReportId) -> Result<[u64; 5], CommunityError>;
}

#[async_trait]
pub trait IReputationRepository: Send + Sync {
    async fn append(&self, event: &ReputationEvent) -> Result<(), CommunityError>;

    /// Raw ledger sum, may be negative
    async fn total(&self, user_id: &UserId) -> Result<i64, CommunityError>;

    /// Sum of positive points recorded at or after `since`
    async fn gained_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, CommunityError>;

    /// Newest first
    async fn recent(&self, user_id: &UserId, limit: u32)
    -> Result<Vec<ReputationEvent>, CommunityError>;
}
