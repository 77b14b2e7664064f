//! Star ratings of audit reports

use chrono::Utc;
use std::sync::Arc;

use super::content_filter::{AuthorContext, ContentFilterService, Decision};
use super::reputation::ReputationService;
use super::{ActionRateLimiter, Actor, is_trusted};
use crate::application::errors::ApplicationError;
use crate::domain::community::{
    entities::{Rating, RatingSummary},
    errors::CommunityError,
    repositories::IRatingRepository,
    value_objects::{CommunityAction, ContentStatus, RatingId, RatingScore, ReportId, ReputationEventKind},
};

pub struct RatingService {
    ratings: Arc<dyn IRatingRepository>,
    filter: Arc<ContentFilterService>,
    reputation: Arc<ReputationService>,
    limiter: Arc<dyn ActionRateLimiter>,
}

impl RatingService {
    pub fn new(
        ratings: Arc<dyn IRatingRepository>,
        filter: Arc<ContentFilterService>,
        reputation: Arc<ReputationService>,
        limiter: Arc<dyn ActionRateLimiter>,
    ) -> Self {
        Self {
            ratings,
            filter,
            reputation,
            limiter,
        }
    }

    /// Create or replace the actor's rating of a report.
    ///
    /// A review held for moderation keeps the rating out of the summary.
    #[tracing::instrument(skip(self, actor, review), fields(user_id = %actor.user_id, report_id = %report_id))]
    pub async fn rate_report(
        &self,
        actor: &Actor,
        report_id: ReportId,
        score: i64,
        review: Option<String>,
    ) -> Result<Rating, ApplicationError> {
        let level = self.reputation.level(&actor.user_id).await?;
        self.limiter
            .check(actor.user_id.as_uuid(), CommunityAction::Rating, is_trusted(level))
            .await?;

        let score = u8::try_from(score)
            .map_err(|_| format!("rating must be between 1 and 5, got {}", score))
            .and_then(RatingScore::new)
            .map_err(|reason| CommunityError::InvalidInput { reason })?;

        let (review, status) = match review.filter(|r| !r.trim().is_empty()) {
            None => (None, ContentStatus::Published),
            Some(text) => {
                let verdict = self.filter.evaluate(
                    &text,
                    AuthorContext {
                        reputation_level: level,
                    },
                );
                match verdict.decision {
                    Decision::Reject => {
                        return Err(CommunityError::ContentRejected {
                            violations: verdict.violation_messages(),
                        }
                        .into());
                    }
                    Decision::Review => (Some(verdict.sanitized), ContentStatus::Pending),
                    Decision::Allow => (Some(verdict.sanitized), ContentStatus::Published),
                }
            }
        };

        let existing = self.ratings.find(&report_id, &actor.user_id).await?;
        let now = Utc::now();
        let rating = Rating {
            id: existing.as_ref().map_or_else(RatingId::generate, |r| r.id),
            report_id,
            user_id: actor.user_id,
            score,
            review,
            status,
            created_at: existing.as_ref().map_or(now, |r| r.created_at),
            updated_at: now,
        };
        self.ratings.upsert(&rating).await?;

        if existing.is_none() {
            self.reputation
                .record(
                    &actor.user_id,
                    ReputationEventKind::RatingSubmitted,
                    Some(rating.id.as_uuid()),
                )
                .await?;
        }

        tracing::info!(rating_id = %rating.id, score = score.value(), status = %status, "Report rated");
        Ok(rating)
    }

    pub async fn rating_summary(&self, report_id: &ReportId) -> Result<RatingSummary, ApplicationError> {
        let distribution = self.ratings.distribution(report_id).await?;
        Ok(RatingSummary::from_distribution(distribution))
    }
}
