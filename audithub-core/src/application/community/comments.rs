//! Comment threads on audit reports

use std::sync::Arc;

use super::content_filter::{AuthorContext, ContentFilterService, Decision};
use super::reputation::ReputationService;
use super::{ActionRateLimiter, Actor, is_trusted};
use crate::application::errors::ApplicationError;
use crate::domain::community::{
    entities::{Comment, Vote},
    errors::CommunityError,
    repositories::{ICommentRepository, IVoteRepository},
    value_objects::{
        CommentId, CommunityAction, ContentStatus, Privilege, ReputationEventKind, ReportId,
        VoteValue,
    },
};

pub struct CommentService {
    comments: Arc<dyn ICommentRepository>,
    votes: Arc<dyn IVoteRepository>,
    filter: Arc<ContentFilterService>,
    reputation: Arc<ReputationService>,
    limiter: Arc<dyn ActionRateLimiter>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn ICommentRepository>,
        votes: Arc<dyn IVoteRepository>,
        filter: Arc<ContentFilterService>,
        reputation: Arc<ReputationService>,
        limiter: Arc<dyn ActionRateLimiter>,
    ) -> Self {
        Self {
            comments,
            votes,
            filter,
            reputation,
            limiter,
        }
    }

    async fn load(&self, id: &CommentId) -> Result<Comment, ApplicationError> {
        self.comments.find_by_id(id).await?.ok_or_else(|| {
            CommunityError::NotFound {
                resource: "comment",
                id: id.to_string(),
            }
            .into()
        })
    }

    #[tracing::instrument(skip(self, actor, body), fields(user_id = %actor.user_id, report_id = %report_id))]
    pub async fn post_comment(
        &self,
        actor: &Actor,
        report_id: ReportId,
        parent_id: Option<CommentId>,
        body: &str,
    ) -> Result<Comment, ApplicationError> {
        let level = self.reputation.level(&actor.user_id).await?;
        self.limiter
            .check(actor.user_id.as_uuid(), CommunityAction::Comment, is_trusted(level))
            .await?;

        if let Some(parent_id) = parent_id {
            let parent = self.load(&parent_id).await?;
            if parent.report_id != report_id {
                return Err(CommunityError::InvalidInput {
                    reason: "parent comment belongs to another report".into(),
                }
                .into());
            }
            if parent.status == ContentStatus::Removed {
                return Err(CommunityError::InvalidState {
                    reason: "cannot reply to a removed comment".into(),
                }
                .into());
            }
        }

        let verdict = self.filter.evaluate(
            body,
            AuthorContext {
                reputation_level: level,
            },
        );
        let status = match verdict.decision {
            Decision::Reject => {
                tracing::info!(violations = ?verdict.violations, "Comment rejected by content filter");
                return Err(CommunityError::ContentRejected {
                    violations: verdict.violation_messages(),
                }
                .into());
            }
            Decision::Review => ContentStatus::Pending,
            Decision::Allow => ContentStatus::Published,
        };

        let comment = Comment::new(report_id, actor.user_id, parent_id, verdict.sanitized, status);
        self.comments.create(&comment).await?;

        if status == ContentStatus::Published {
            self.reputation
                .record(
                    &actor.user_id,
                    ReputationEventKind::CommentPublished,
                    Some(comment.id.as_uuid()),
                )
                .await?;
        }

        tracing::info!(comment_id = %comment.id, status = %status, "Comment posted");
        Ok(comment)
    }

    /// Published comments, plus pending ones the viewer may see, oldest first
    pub async fn list_comments(
        &self,
        report_id: &ReportId,
        viewer: Option<&Actor>,
    ) -> Result<Vec<Comment>, ApplicationError> {
        let sees_all_pending = match viewer {
            Some(actor) => self.reputation.can_moderate(actor).await?,
            None => false,
        };
        let viewer_id = viewer.map(|a| a.user_id);

        Ok(self
            .comments
            .list_for_report(report_id)
            .await?
            .into_iter()
            .filter(|c| match c.status {
                ContentStatus::Published => true,
                ContentStatus::Pending => sees_all_pending || Some(c.author_id) == viewer_id,
                ContentStatus::Removed | ContentStatus::Deleted => false,
            })
            .collect())
    }

    /// Authors withdraw their own comments; moderators remove anyone's
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_comment(
        &self,
        actor: &Actor,
        id: &CommentId,
    ) -> Result<Comment, ApplicationError> {
        let mut comment = self.load(id).await?;
        if matches!(comment.status, ContentStatus::Removed | ContentStatus::Deleted) {
            return Err(CommunityError::InvalidState {
                reason: format!("comment is already {}", comment.status),
            }
            .into());
        }

        if comment.author_id == actor.user_id {
            comment.soft_delete();
            self.comments.update(&comment).await?;
            tracing::info!(comment_id = %comment.id, "Comment deleted by author");
            return Ok(comment);
        }

        if !self.reputation.can_moderate(actor).await? {
            return Err(CommunityError::PermissionDenied {
                reason: "only the author or a moderator can delete this comment".into(),
            }
            .into());
        }

        self.remove(&mut comment).await?;
        tracing::info!(comment_id = %comment.id, moderator_id = %actor.user_id, "Comment removed by moderator");
        Ok(comment)
    }

    /// Resolve a pending comment
    #[tracing::instrument(skip(self, moderator), fields(moderator_id = %moderator.user_id))]
    pub async fn moderate_comment(
        &self,
        moderator: &Actor,
        id: &CommentId,
        approve: bool,
    ) -> Result<Comment, ApplicationError> {
        if !self.reputation.can_moderate(moderator).await? {
            return Err(CommunityError::PermissionDenied {
                reason: "moderation requires the moderate privilege".into(),
            }
            .into());
        }

        let mut comment = self.load(id).await?;
        if comment.status != ContentStatus::Pending {
            return Err(CommunityError::InvalidState {
                reason: format!("only pending comments can be moderated, this one is {}", comment.status),
            }
            .into());
        }

        if approve {
            comment.set_status(ContentStatus::Published);
            self.comments.update(&comment).await?;
            self.reputation
                .record(
                    &comment.author_id,
                    ReputationEventKind::CommentPublished,
                    Some(comment.id.as_uuid()),
                )
                .await?;
        } else {
            self.remove(&mut comment).await?;
        }

        tracing::info!(comment_id = %comment.id, approve, "Comment moderated");
        Ok(comment)
    }

    async fn remove(&self, comment: &mut Comment) -> Result<(), ApplicationError> {
        comment.set_status(ContentStatus::Removed);
        self.comments.update(comment).await?;
        self.reputation
            .record(
                &comment.author_id,
                ReputationEventKind::CommentRemoved,
                Some(comment.id.as_uuid()),
            )
            .await?;
        Ok(())
    }

    /// Cast or change a vote. Repeating the current vote changes nothing.
    #[tracing::instrument(skip(self, voter), fields(user_id = %voter.user_id, comment_id = %comment_id))]
    pub async fn vote(
        &self,
        voter: &Actor,
        comment_id: &CommentId,
        value: VoteValue,
    ) -> Result<Comment, ApplicationError> {
        let level = self.reputation.level(&voter.user_id).await?;
        self.limiter
            .check(voter.user_id.as_uuid(), CommunityAction::Vote, is_trusted(level))
            .await?;

        let comment = self.load(comment_id).await?;
        if comment.author_id == voter.user_id {
            return Err(CommunityError::PermissionDenied {
                reason: "you cannot vote on your own comment".into(),
            }
            .into());
        }
        if comment.status != ContentStatus::Published {
            return Err(CommunityError::InvalidState {
                reason: "only published comments can be voted on".into(),
            }
            .into());
        }
        if value == VoteValue::Down && level < Privilege::Downvote.required_level() {
            return Err(CommunityError::InsufficientReputation {
                privilege: Privilege::Downvote.as_str().into(),
            }
            .into());
        }

        let previous = self
            .votes
            .find(comment_id, &voter.user_id)
            .await?
            .map(|v| v.value);
        if previous == Some(value) {
            return Ok(comment);
        }

        self.votes
            .upsert(&Vote {
                comment_id: *comment_id,
                voter_id: voter.user_id,
                value,
                updated_at: chrono::Utc::now(),
            })
            .await?;
        let delta = value.as_i16() as i32 - previous.map_or(0, |p| p.as_i16() as i32);
        self.comments.adjust_score(comment_id, delta).await?;
        self.reputation
            .apply_vote(&comment.author_id, comment_id.as_uuid(), previous, Some(value))
            .await?;

        self.load(comment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModerationConfig, ReputationConfig};
    use crate::domain::auth::value_objects::{UserId, UserRole};
    use crate::infrastructure::memory::{
        InMemoryCommentRepository, InMemoryLoginRepository, InMemoryReputationRepository,
        InMemoryVoteRepository,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct SwitchLimiter {
        blocked: AtomicBool,
    }

    #[async_trait]
    impl ActionRateLimiter for SwitchLimiter {
        async fn check(&self, _: Uuid, _: CommunityAction, _: bool) -> Result<(), ApplicationError> {
            if self.blocked.load(Ordering::SeqCst) {
                Err(ApplicationError::RateLimited { retry_after: 30 })
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        service: CommentService,
        reputation: Arc<ReputationService>,
        limiter: Arc<SwitchLimiter>,
    }

    fn fixture() -> Fixture {
        let reputation = Arc::new(ReputationService::new(
            Arc::new(InMemoryReputationRepository::new()),
            Arc::new(InMemoryLoginRepository::new()),
            ReputationConfig::default(),
        ));
        let limiter = Arc::new(SwitchLimiter::default());
        let filter = Arc::new(
            ContentFilterService::new(ModerationConfig {
                banned_terms: vec!["scam".into()],
                ..ModerationConfig::default()
            })
            .unwrap(),
        );
        Fixture {
            service: CommentService::new(
                Arc::new(InMemoryCommentRepository::new()),
                Arc::new(InMemoryVoteRepository::new()),
                filter,
                reputation.clone(),
                limiter.clone(),
            ),
            reputation,
            limiter,
        }
    }

    fn member() -> Actor {
        Actor::new(UserId::generate(), vec![UserRole::User])
    }

    fn moderator() -> Actor {
        Actor::new(UserId::generate(), vec![UserRole::User, UserRole::Moderator])
    }

    async fn promote(f: &Fixture, actor: &Actor, points: i32) {
        f.reputation
            .record_points(&actor.user_id, ReputationEventKind::CommentUpvoted, points, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_publishes_clean_text_and_awards_points() {
        let f = fixture();
        let author = member();
        let report = ReportId::generate();

        let comment = f
            .service
            .post_comment(&author, report, None, "  Solid finding.  ")
            .await
            .unwrap();
        assert_eq!(comment.status, ContentStatus::Published);
        assert_eq!(comment.body, "Solid finding.");
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejected_and_pending_comments() {
        let f = fixture();
        let author = member();
        let report = ReportId::generate();

        let rejected = f.service.post_comment(&author, report, None, "total scam").await;
        assert!(matches!(
            rejected,
            Err(ApplicationError::Community(CommunityError::ContentRejected { .. }))
        ));

        let pending = f
            .service
            .post_comment(&author, report, None, "details at https://example.com")
            .await
            .unwrap();
        assert_eq!(pending.status, ContentStatus::Pending);
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 0);

        // Visible to its author and moderators only
        assert_eq!(f.service.list_comments(&report, None).await.unwrap().len(), 0);
        assert_eq!(f.service.list_comments(&report, Some(&member())).await.unwrap().len(), 0);
        assert_eq!(f.service.list_comments(&report, Some(&author)).await.unwrap().len(), 1);
        assert_eq!(f.service.list_comments(&report, Some(&moderator())).await.unwrap().len(), 1);

        let approved = f
            .service
            .moderate_comment(&moderator(), &pending.id, true)
            .await
            .unwrap();
        assert_eq!(approved.status, ContentStatus::Published);
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 2);

        let again = f.service.moderate_comment(&moderator(), &pending.id, false).await;
        assert!(matches!(
            again,
            Err(ApplicationError::Community(CommunityError::InvalidState { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_posting() {
        let f = fixture();
        f.limiter.blocked.store(true, Ordering::SeqCst);
        let result = f
            .service
            .post_comment(&member(), ReportId::generate(), None, "hello there")
            .await;
        assert!(matches!(result, Err(ApplicationError::RateLimited { retry_after: 30 })));
    }

    #[tokio::test]
    async fn test_reply_rules() {
        let f = fixture();
        let author = member();
        let report = ReportId::generate();
        let parent = f
            .service
            .post_comment(&author, report, None, "parent comment")
            .await
            .unwrap();

        let reply = f
            .service
            .post_comment(&member(), report, Some(parent.id), "a reply")
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(parent.id));

        let cross_report = f
            .service
            .post_comment(&member(), ReportId::generate(), Some(parent.id), "misplaced")
            .await;
        assert!(matches!(
            cross_report,
            Err(ApplicationError::Community(CommunityError::InvalidInput { .. }))
        ));

        let missing = f
            .service
            .post_comment(&member(), report, Some(CommentId::generate()), "orphan")
            .await;
        assert!(matches!(
            missing,
            Err(ApplicationError::Community(CommunityError::NotFound { .. }))
        ));

        f.service.delete_comment(&moderator(), &parent.id).await.unwrap();
        let to_removed = f
            .service
            .post_comment(&member(), report, Some(parent.id), "late reply")
            .await;
        assert!(matches!(
            to_removed,
            Err(ApplicationError::Community(CommunityError::InvalidState { .. }))
        ));
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let f = fixture();
        let author = member();
        let report = ReportId::generate();
        let first = f.service.post_comment(&author, report, None, "first").await.unwrap();
        let second = f.service.post_comment(&author, report, None, "second").await.unwrap();

        let stranger = f.service.delete_comment(&member(), &first.id).await;
        assert!(matches!(
            stranger,
            Err(ApplicationError::Community(CommunityError::PermissionDenied { .. }))
        ));

        let withdrawn = f.service.delete_comment(&author, &first.id).await.unwrap();
        assert_eq!(withdrawn.status, ContentStatus::Deleted);
        assert!(withdrawn.body.is_empty());
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 4);

        let removed = f.service.delete_comment(&moderator(), &second.id).await.unwrap();
        assert_eq!(removed.status, ContentStatus::Removed);
        // 2 + 2 - 10, floored
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 0);
        assert!(f.service.list_comments(&report, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voting() {
        let f = fixture();
        let author = member();
        let voter = member();
        let comment = f
            .service
            .post_comment(&author, ReportId::generate(), None, "vote on me")
            .await
            .unwrap();

        let own = f.service.vote(&author, &comment.id, VoteValue::Up).await;
        assert!(matches!(
            own,
            Err(ApplicationError::Community(CommunityError::PermissionDenied { .. }))
        ));

        let newcomer_down = f.service.vote(&voter, &comment.id, VoteValue::Down).await;
        assert!(matches!(
            newcomer_down,
            Err(ApplicationError::Community(CommunityError::InsufficientReputation { .. }))
        ));

        let up = f.service.vote(&voter, &comment.id, VoteValue::Up).await.unwrap();
        assert_eq!(up.score, 1);
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 7);

        let repeat = f.service.vote(&voter, &comment.id, VoteValue::Up).await.unwrap();
        assert_eq!(repeat.score, 1);
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 7);

        promote(&f, &voter, 60).await;
        let down = f.service.vote(&voter, &comment.id, VoteValue::Down).await.unwrap();
        assert_eq!(down.score, -1);
        // 2 + 5 - 7
        assert_eq!(f.reputation.score(&author.user_id).await.unwrap(), 0);
    }
}
