//! Reputation ledger: points, levels, privileges, and the daily gain cap

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::Actor;
use crate::application::errors::ApplicationError;
use crate::config::ReputationConfig;
use crate::domain::auth::{repositories::ILoginRepository, value_objects::UserId};
use crate::domain::community::{
    entities::ReputationEvent,
    errors::CommunityError,
    repositories::IReputationRepository,
    value_objects::{Privilege, ReputationEventKind, ReputationLevel, VoteValue},
};

const RECENT_EVENTS: u32 = 10;

/// Standing of one user
#[derive(Debug, Clone)]
pub struct ReputationSummary {
    pub user_id: UserId,
    pub score: i64,
    pub level: ReputationLevel,
    pub next_level: Option<ReputationLevel>,
    pub points_to_next: Option<i64>,
    pub privileges: Vec<Privilege>,
    pub recent_events: Vec<ReputationEvent>,
}

pub struct ReputationService {
    repository: Arc<dyn IReputationRepository>,
    logins: Arc<dyn ILoginRepository>,
    config: ReputationConfig,
}

impl ReputationService {
    pub fn new(
        repository: Arc<dyn IReputationRepository>,
        logins: Arc<dyn ILoginRepository>,
        config: ReputationConfig,
    ) -> Self {
        Self {
            repository,
            logins,
            config,
        }
    }

    pub fn threshold(&self, level: ReputationLevel) -> i64 {
        let thresholds = &self.config.thresholds;
        match level {
            ReputationLevel::Newcomer => 0,
            ReputationLevel::Contributor => thresholds.contributor,
            ReputationLevel::Trusted => thresholds.trusted,
            ReputationLevel::Expert => thresholds.expert,
        }
    }

    pub fn level_for(&self, score: i64) -> ReputationLevel {
        [
            ReputationLevel::Expert,
            ReputationLevel::Trusted,
            ReputationLevel::Contributor,
        ]
        .into_iter()
        .find(|level| score >= self.threshold(*level))
        .unwrap_or(ReputationLevel::Newcomer)
    }

    /// Configured points for fixed-value events; vote retractions carry a
    /// computed delta instead
    pub fn points_for(&self, kind: ReputationEventKind) -> i32 {
        let points = &self.config.points;
        match kind {
            ReputationEventKind::CommentPublished => points.comment_published,
            ReputationEventKind::CommentUpvoted => points.comment_upvoted,
            ReputationEventKind::CommentDownvoted => points.comment_downvoted,
            ReputationEventKind::CommentRemoved => points.comment_removed,
            ReputationEventKind::RatingSubmitted => points.rating_submitted,
            ReputationEventKind::VoteRetracted => 0,
        }
    }

    fn vote_points(&self, vote: Option<VoteValue>) -> i32 {
        match vote {
            Some(VoteValue::Up) => self.points_for(ReputationEventKind::CommentUpvoted),
            Some(VoteValue::Down) => self.points_for(ReputationEventKind::CommentDownvoted),
            None => 0,
        }
    }

    /// Ledger sum, floored at zero
    pub async fn score(&self, user_id: &UserId) -> Result<i64, ApplicationError> {
        Ok(self.repository.total(user_id).await?.max(0))
    }

    pub async fn level(&self, user_id: &UserId) -> Result<ReputationLevel, ApplicationError> {
        Ok(self.level_for(self.score(user_id).await?))
    }

    pub async fn has_privilege(
        &self,
        actor: &Actor,
        privilege: Privilege,
    ) -> Result<bool, ApplicationError> {
        if privilege == Privilege::Moderate && actor.can_moderate_by_role() {
            return Ok(true);
        }
        Ok(self.level(&actor.user_id).await? >= privilege.required_level())
    }

    pub async fn can_moderate(&self, actor: &Actor) -> Result<bool, ApplicationError> {
        self.has_privilege(actor, Privilege::Moderate).await
    }

    /// Record a fixed-value event
    pub async fn record(
        &self,
        user_id: &UserId,
        kind: ReputationEventKind,
        source_id: Option<Uuid>,
    ) -> Result<ReputationEvent, ApplicationError> {
        self.record_points(user_id, kind, self.points_for(kind), source_id)
            .await
    }

    /// Positive points beyond today's remaining allowance are recorded as 0
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn record_points(
        &self,
        user_id: &UserId,
        kind: ReputationEventKind,
        points: i32,
        source_id: Option<Uuid>,
    ) -> Result<ReputationEvent, ApplicationError> {
        let now = Utc::now();
        let points = if points > 0 {
            let gained = self
                .repository
                .gained_since(user_id, start_of_utc_day(now))
                .await?;
            let remaining = (self.config.daily_gain_cap - gained).max(0);
            i64::from(points).min(remaining) as i32
        } else {
            points
        };

        let event = ReputationEvent {
            id: Uuid::new_v4(),
            user_id: *user_id,
            kind,
            points,
            source_id,
            created_at: now,
        };
        self.repository.append(&event).await?;

        tracing::debug!(kind = kind.as_str(), points, "Reputation event recorded");
        Ok(event)
    }

    /// Record the change of one vote on an author's comment as a single event.
    ///
    /// Returns `None` when the vote did not change.
    pub async fn apply_vote(
        &self,
        author_id: &UserId,
        comment_id: Uuid,
        previous: Option<VoteValue>,
        new: Option<VoteValue>,
    ) -> Result<Option<ReputationEvent>, ApplicationError> {
        if previous == new {
            return Ok(None);
        }
        let delta = self.vote_points(new) - self.vote_points(previous);
        let kind = match (previous, new) {
            (None, Some(VoteValue::Up)) => ReputationEventKind::CommentUpvoted,
            (None, Some(VoteValue::Down)) => ReputationEventKind::CommentDownvoted,
            _ => ReputationEventKind::VoteRetracted,
        };
        self.record_points(author_id, kind, delta, Some(comment_id))
            .await
            .map(Some)
    }

    pub async fn summary(&self, user_id: &UserId) -> Result<ReputationSummary, ApplicationError> {
        let login = self
            .logins
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CommunityError::NotFound {
                resource: "user",
                id: user_id.to_string(),
            })?;

        let score = self.score(user_id).await?;
        let level = self.level_for(score);
        let next_level = level.next();

        let mut privileges = Privilege::granted_at(level);
        if login.can_moderate() && !privileges.contains(&Privilege::Moderate) {
            privileges.push(Privilege::Moderate);
        }

        Ok(ReputationSummary {
            user_id: *user_id,
            score,
            level,
            next_level,
            points_to_next: next_level.map(|next| self.threshold(next) - score),
            privileges,
            recent_events: self.repository.recent(user_id, RECENT_EVENTS).await?,
        })
    }
}

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}
