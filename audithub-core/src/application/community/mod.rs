//! Community services: moderation, reputation, comments, and ratings

pub mod comments;
pub mod content_filter;
pub mod ratings;
pub mod reputation;

pub use comments::CommentService;
pub use content_filter::{
    AuthorContext, ContentFilterService, Decision, ModerationVerdict, Violation,
};
pub use ratings::RatingService;
pub use reputation::{ReputationService, ReputationSummary};

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::errors::ApplicationError;
use crate::domain::auth::value_objects::{UserId, UserRole};
use crate::domain::community::value_objects::{CommunityAction, ReputationLevel};

/// Authenticated user performing a community action
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<UserRole>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: Vec<UserRole>) -> Self {
        Self { user_id, roles }
    }

    pub fn can_moderate_by_role(&self) -> bool {
        self.roles.iter().any(|r| r.can_moderate())
    }
}

/// Per-user limit on community actions.
///
/// `Err(ApplicationError::RateLimited)` when the action is over its budget.
#[async_trait]
pub trait ActionRateLimiter: Send + Sync {
    async fn check(
        &self,
        user_id: Uuid,
        action: CommunityAction,
        trusted: bool,
    ) -> Result<(), ApplicationError>;
}

/// Whether a level earns the trusted bonus on action limits
pub(crate) fn is_trusted(level: ReputationLevel) -> bool {
    level >= ReputationLevel::Trusted
}
