//! Comment, vote, rating, and reputation ledger entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::*;
use crate::domain::auth::value_objects::UserId;

/// Comment on an audit report
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: CommentId,
    pub report_id: ReportId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub body: String,
    pub status: ContentStatus,
    /// Sum of votes
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        report_id: ReportId,
        author_id: UserId,
        parent_id: Option<CommentId>,
        body: String,
        status: ContentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CommentId::generate(),
            report_id,
            author_id,
            parent_id,
            body,
            status,
            score: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_visible_to_public(&self) -> bool {
        self.status == ContentStatus::Published
    }

    pub fn set_status(&mut self, status: ContentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Author withdrawal keeps the row for thread structure but drops the text
    pub fn soft_delete(&mut self) {
        self.body.clear();
        self.set_status(ContentStatus::Deleted);
    }
}

/// One user's vote on one comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub comment_id: CommentId,
    pub voter_id: UserId,
    pub value: VoteValue,
    pub updated_at: DateTime<Utc>,
}

/// One user's rating of one report
#[derive(Debug, Clone)]
pub struct Rating {
    pub id: RatingId,
    pub report_id: ReportId,
    pub user_id: UserId,
    pub score: RatingScore,
    pub review: Option<String>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate over published ratings of a report
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSummary {
    pub count: u64,
    /// Rounded to two decimals; 0 when there are no ratings
    pub average: f64,
    /// Counts for 1..=5 stars
    pub distribution: [u64; 5],
}

impl RatingSummary {
    pub fn from_distribution(distribution: [u64; 5]) -> Self {
        let count: u64 = distribution.iter().sum();
        let weighted: u64 = distribution
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u64 + 1) * n)
            .sum();
        let average = if count == 0 {
            0.0
        } else {
            ((weighted as f64 / count as f64) * 100.0).round() / 100.0
        };
        Self {
            count,
            average,
            distribution,
        }
    }
}

/// Reputation ledger row
#[derive(Debug, Clone)]
pub struct ReputationEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: ReputationEventKind,
    pub points: i32,
    /// Comment or rating that caused the event
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
