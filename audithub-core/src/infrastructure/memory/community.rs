use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::auth::value_objects::UserId;
use crate::domain::community::{
    entities::{Comment, Rating, ReputationEvent, Vote},
    errors::CommunityError,
    repositories::{ICommentRepository, IRatingRepository, IReputationRepository, IVoteRepository},
    value_objects::{CommentId, ContentStatus, ReportId},
};

fn comment_not_found(id: &CommentId) -> CommunityError {
    CommunityError::NotFound {
        resource: "comment",
        id: id.to_string(),
    }
}

/// Comments in insertion order, which is creation order
#[derive(Default)]
pub struct InMemoryCommentRepository {
    comments: RwLock<Vec<Comment>>,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ICommentRepository for InMemoryCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<(), CommunityError> {
        self.comments.write().await.push(comment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &CommentId) -> Result<Option<Comment>, CommunityError> {
        let comments = self.comments.read().await;
        Ok(comments.iter().find(|c| &c.id == id).cloned())
    }

    async fn update(&self, comment: &Comment) -> Result<(), CommunityError> {
        let mut comments = self.comments.write().await;
        let existing = comments
            .iter_mut()
            .find(|c| c.id == comment.id)
            .ok_or_else(|| comment_not_found(&comment.id))?;
        // Score is only moved through adjust_score
        let score = existing.score;
        *existing = Comment {
            score,
            ..comment.clone()
        };
        Ok(())
    }

    async fn list_for_report(&self, report_id: &ReportId) -> Result<Vec<Comment>, CommunityError> {
        let comments = self.comments.read().await;
        Ok(comments
            .iter()
            .filter(|c| &c.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn adjust_score(&self, id: &CommentId, delta: i32) -> Result<(), CommunityError> {
        let mut comments = self.comments.write().await;
        let comment = comments
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| comment_not_found(id))?;
        comment.score += delta;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVoteRepository {
    votes: RwLock<HashMap<(CommentId, UserId), Vote>>,
}

impl InMemoryVoteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IVoteRepository for InMemoryVoteRepository {
    async fn find(
        &self,
        comment_id: &CommentId,
        voter_id: &UserId,
    ) -> Result<Option<Vote>, CommunityError> {
        let votes = self.votes.read().await;
        Ok(votes.get(&(*comment_id, *voter_id)).cloned())
    }

    async fn upsert(&self, vote: &Vote) -> Result<(), CommunityError> {
        self.votes
            .write()
            .await
            .insert((vote.comment_id, vote.voter_id), vote.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRatingRepository {
    ratings: RwLock<HashMap<(ReportId, UserId), Rating>>,
}

impl InMemoryRatingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IRatingRepository for InMemoryRatingRepository {
    async fn find(
        &self,
        report_id: &ReportId,
        user_id: &UserId,
    ) -> Result<Option<Rating>, CommunityError> {
        let ratings = self.ratings.read().await;
        Ok(ratings.get(&(*report_id, *user_id)).cloned())
    }

    async fn upsert(&self, rating: &Rating) -> Result<(), CommunityError> {
        let mut ratings = self.ratings.write().await;
        let key = (rating.report_id, rating.user_id);
        let stored = match ratings.get(&key) {
            // Identity and creation time belong to the first submission
            Some(existing) => Rating {
                id: existing.id,
                created_at: existing.created_at,
                ..rating.clone()
            },
            None => rating.clone(),
        };
        ratings.insert(key, stored);
        Ok(())
    }

    async fn distribution(&self, report_id: &ReportId) -> Result<[u64; 5], CommunityError> {
        let ratings = self.ratings.read().await;
        let mut distribution = [0u64; 5];
        for rating in ratings
            .values()
            .filter(|r| &r.report_id == report_id && r.status == ContentStatus::Published)
        {
            distribution[(rating.score.value() - 1) as usize] += 1;
        }
        Ok(distribution)
    }
}

#[derive(Default)]
pub struct InMemoryReputationRepository {
    events: RwLock<Vec<ReputationEvent>>,
}

impl InMemoryReputationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IReputationRepository for InMemoryReputationRepository {
    async fn append(&self, event: &ReputationEvent) -> Result<(), CommunityError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn total(&self, user_id: &UserId) -> Result<i64, CommunityError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| &e.user_id == user_id)
            .map(|e| e.points as i64)
            .sum())
    }

    async fn gained_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<i64, CommunityError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| &e.user_id == user_id && e.created_at >= since && e.points > 0)
            .map(|e| e.points as i64)
            .sum())
    }

    async fn recent(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<ReputationEvent>, CommunityError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|e| &e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
