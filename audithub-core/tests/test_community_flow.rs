//! Community services wired to the real sliding-window action limiter

use std::sync::Arc;

use audithub_core::application::community::{
    Actor, CommentService, ContentFilterService, RatingService, ReputationService,
};
use audithub_core::application::errors::ApplicationError;
use audithub_core::config::{
    ActionLimitConfig, ModerationConfig, RateLimitStorageBackend, ReputationConfig,
    TieredRateLimitConfig,
};
use audithub_core::domain::auth::repositories::ILoginRepository;
use audithub_core::domain::auth::{
    entities::Login,
    value_objects::{Email, PasswordHash, UserRole, Username},
};
use audithub_core::domain::community::errors::CommunityError;
use audithub_core::domain::community::value_objects::{
    ContentStatus, ReportId, ReputationLevel, VoteValue,
};
use audithub_core::infrastructure::memory::{
    InMemoryCommentRepository, InMemoryLoginRepository, InMemoryRatingRepository,
    InMemoryReputationRepository, InMemoryVoteRepository,
};
use audithub_core::infrastructure::rate_limiter::{InMemoryRateLimitStorage, RateLimiterService};

struct Community {
    comments: CommentService,
    ratings: RatingService,
    reputation: Arc<ReputationService>,
    logins: Arc<InMemoryLoginRepository>,
}

fn community() -> Community {
    let mut limits = TieredRateLimitConfig {
        storage_backend: RateLimitStorageBackend::Memory,
        ..TieredRateLimitConfig::default()
    };
    limits.actions.comment = ActionLimitConfig {
        per_minute: 3,
        per_hour: 30,
    };
    let limiter = Arc::new(RateLimiterService::with_storage(
        Arc::new(InMemoryRateLimitStorage::new()),
        limits,
    ));

    let logins = Arc::new(InMemoryLoginRepository::new());
    let reputation = Arc::new(ReputationService::new(
        Arc::new(InMemoryReputationRepository::new()),
        logins.clone(),
        ReputationConfig::default(),
    ));
    let filter = Arc::new(ContentFilterService::new(ModerationConfig::default()).unwrap());

    Community {
        comments: CommentService::new(
            Arc::new(InMemoryCommentRepository::new()),
            Arc::new(InMemoryVoteRepository::new()),
            filter.clone(),
            reputation.clone(),
            limiter.clone(),
        ),
        ratings: RatingService::new(
            Arc::new(InMemoryRatingRepository::new()),
            filter,
            reputation.clone(),
            limiter,
        ),
        reputation,
        logins,
    }
}

async fn member(c: &Community, name: &str, roles: Vec<UserRole>) -> Actor {
    let mut login = Login::new_with_password(
        Email::new(format!("{name}@example.com")).unwrap(),
        Username::new(name.to_string()).unwrap(),
        PasswordHash::new("$argon2id$stub".to_string()),
    );
    login.roles = roles.clone();
    c.logins.create(&login).await.unwrap();
    Actor::new(login.user_id, roles)
}

#[tokio::test]
async fn test_comment_limit_applies_per_user() {
    let c = community();
    let alice = member(&c, "alice", vec![UserRole::User]).await;
    let bob = member(&c, "bob", vec![UserRole::User]).await;
    let report = ReportId::generate();

    for i in 0..3 {
        c.comments
            .post_comment(&alice, report, None, &format!("Finding {i} reproduces on 2.1"))
            .await
            .unwrap();
    }
    let limited = c
        .comments
        .post_comment(&alice, report, None, "One more observation")
        .await;
    assert!(matches!(
        limited,
        Err(ApplicationError::RateLimited { retry_after }) if retry_after > 0
    ));

    // Bob's budget is separate
    c.comments
        .post_comment(&bob, report, None, "Confirmed on my side too")
        .await
        .unwrap();

    let listed = c.comments.list_comments(&report, None).await.unwrap();
    assert_eq!(listed.len(), 4);
}

#[tokio::test]
async fn test_votes_feed_author_reputation() {
    let c = community();
    let author = member(&c, "author", vec![UserRole::User]).await;
    let voter = member(&c, "voter", vec![UserRole::User]).await;
    let report = ReportId::generate();

    let comment = c
        .comments
        .post_comment(&author, report, None, "The nonce is reused across sessions")
        .await
        .unwrap();
    assert_eq!(comment.status, ContentStatus::Published);
    let after_post = c.reputation.score(&author.user_id).await.unwrap();
    assert_eq!(after_post, 2);

    let voted = c
        .comments
        .vote(&voter, &comment.id, VoteValue::Up)
        .await
        .unwrap();
    assert_eq!(voted.score, 1);
    assert_eq!(c.reputation.score(&author.user_id).await.unwrap(), 7);

    // Repeating a vote is a no-op
    c.comments
        .vote(&voter, &comment.id, VoteValue::Up)
        .await
        .unwrap();
    assert_eq!(c.reputation.score(&author.user_id).await.unwrap(), 7);

    // Newcomers cannot downvote
    let down = c.comments.vote(&voter, &comment.id, VoteValue::Down).await;
    assert!(matches!(
        down,
        Err(ApplicationError::Community(CommunityError::InsufficientReputation { .. }))
    ));

    let summary = c.reputation.summary(&author.user_id).await.unwrap();
    assert_eq!(summary.level, ReputationLevel::Newcomer);
    assert_eq!(summary.next_level, Some(ReputationLevel::Contributor));
    assert_eq!(summary.points_to_next, Some(43));
}

#[tokio::test]
async fn test_moderator_removal_penalizes_author() {
    let c = community();
    let author = member(&c, "author", vec![UserRole::User]).await;
    let moderator = member(&c, "mod", vec![UserRole::Moderator]).await;
    let stranger = member(&c, "stranger", vec![UserRole::User]).await;
    let report = ReportId::generate();

    let comment = c
        .comments
        .post_comment(&author, report, None, "Off-topic remark about tabs")
        .await
        .unwrap();

    let denied = c.comments.delete_comment(&stranger, &comment.id).await;
    assert!(matches!(
        denied,
        Err(ApplicationError::Community(CommunityError::PermissionDenied { .. }))
    ));

    let removed = c
        .comments
        .delete_comment(&moderator, &comment.id)
        .await
        .unwrap();
    assert_eq!(removed.status, ContentStatus::Removed);
    // +2 for publishing, -10 for removal, floored at zero
    assert_eq!(c.reputation.score(&author.user_id).await.unwrap(), 0);

    let reply = c
        .comments
        .post_comment(&author, report, Some(comment.id), "But why?")
        .await;
    assert!(matches!(
        reply,
        Err(ApplicationError::Community(CommunityError::InvalidState { .. }))
    ));
    assert!(c.comments.list_comments(&report, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ratings_replace_and_summarize() {
    let c = community();
    let alice = member(&c, "alice", vec![UserRole::User]).await;
    let bob = member(&c, "bob", vec![UserRole::User]).await;
    let report = ReportId::generate();

    c.ratings.rate_report(&alice, report, 2, None).await.unwrap();
    c.ratings
        .rate_report(&alice, report, 4, Some("Thorough write-up".into()))
        .await
        .unwrap();
    c.ratings.rate_report(&bob, report, 5, None).await.unwrap();

    let summary = c.ratings.rating_summary(&report).await.unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.average, 4.5);
    assert_eq!(summary.distribution, [0, 0, 0, 1, 1]);

    let invalid = c.ratings.rate_report(&bob, report, 6, None).await;
    assert!(matches!(
        invalid,
        Err(ApplicationError::Community(CommunityError::InvalidInput { .. }))
    ));
}
