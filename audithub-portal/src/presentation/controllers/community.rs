//! Community feedback on audit reports: comments, votes, ratings, reputation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Json, Response},
};
use tracing::instrument;
use uuid::Uuid;

use audithub_core::application::errors::ApplicationError;
use audithub_core::domain::auth::value_objects::UserId;
use audithub_core::domain::community::value_objects::{CommentId, ReportId, VoteValue};

use crate::presentation::auth::{Auth, OptionalAuth};
use crate::presentation::controllers::PortalState;
use crate::presentation::middleware::application_error_to_response;
use crate::presentation::models::{
    CommentDto, CommentListResponse, CreateCommentRequest, ErrorResponse, ModerationAction,
    ModerationRequest, RatingDto, RatingRequest, RatingSummaryResponse, ReputationResponse,
    VoteRequest,
};

/// GET /api/v1/reports/{report_id}/comments - Comment thread for a report
///
/// Anonymous callers see published comments. Authors also see their own
/// pending comments, moderators see all pending ones.
#[utoipa::path(
    get,
    path = "/api/v1/reports/{report_id}/comments",
    params(("report_id" = Uuid, Path, description = "Audit report id")),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentListResponse),
        (status = 401, description = "A bearer token was sent but is invalid", body = ErrorResponse)
    ),
    tag = "community"
)]
pub async fn list_comments(
    State(state): State<PortalState>,
    OptionalAuth(auth): OptionalAuth,
    Path(report_id): Path<Uuid>,
) -> Result<Json<CommentListResponse>, Response> {
    let viewer = auth.as_ref().map(Auth::actor);
    let comments = state
        .comments
        .list_comments(&ReportId::from(report_id), viewer.as_ref())
        .await
        .map_err(application_error_to_response)?;

    let total = comments.len();
    Ok(Json(CommentListResponse {
        comments: comments.into_iter().map(Into::into).collect(),
        total,
    }))
}

/// POST /api/v1/reports/{report_id}/comments - Comment or reply
#[utoipa::path(
    post,
    path = "/api/v1/reports/{report_id}/comments",
    params(("report_id" = Uuid, Path, description = "Audit report id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment stored, published or pending review", body = CommentDto),
        (status = 400, description = "Empty body, or parent on another report", body = ErrorResponse),
        (status = 404, description = "Parent comment not found", body = ErrorResponse),
        (status = 409, description = "Parent comment was removed", body = ErrorResponse),
        (status = 422, description = "Rejected by the content filter", body = ErrorResponse),
        (status = 429, description = "Comment rate limit exceeded", body = ErrorResponse)
    ),
    tag = "community",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth, request), fields(user_id = %auth.user_id))]
pub async fn post_comment(
    State(state): State<PortalState>,
    auth: Auth,
    Path(report_id): Path<Uuid>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentDto>), Response> {
    let comment = state
        .comments
        .post_comment(
            &auth.actor(),
            ReportId::from(report_id),
            request.parent_id.map(CommentId::from),
            &request.body,
        )
        .await
        .map_err(application_error_to_response)?;

    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// DELETE /api/v1/comments/{comment_id} - Withdraw or remove a comment
#[utoipa::path(
    delete,
    path = "/api/v1/comments/{comment_id}",
    params(("comment_id" = Uuid, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment after deletion", body = CommentDto),
        (status = 403, description = "Neither the author nor a moderator", body = ErrorResponse),
        (status = 404, description = "Comment not found", body = ErrorResponse),
        (status = 409, description = "Already deleted or removed", body = ErrorResponse)
    ),
    tag = "community",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn delete_comment(
    State(state): State<PortalState>,
    auth: Auth,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<CommentDto>, Response> {
    let comment = state
        .comments
        .delete_comment(&auth.actor(), &CommentId::from(comment_id))
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(comment.into()))
}

/// POST /api/v1/comments/{comment_id}/moderation - Resolve a pending comment
#[utoipa::path(
    post,
    path = "/api/v1/comments/{comment_id}/moderation",
    params(("comment_id" = Uuid, Path, description = "Comment id")),
    request_body = ModerationRequest,
    responses(
        (status = 200, description = "Comment after moderation", body = CommentDto),
        (status = 403, description = "Caller cannot moderate", body = ErrorResponse),
        (status = 404, description = "Comment not found", body = ErrorResponse),
        (status = 409, description = "Comment is not pending", body = ErrorResponse)
    ),
    tag = "community",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth, request), fields(moderator_id = %auth.user_id))]
pub async fn moderate_comment(
    State(state): State<PortalState>,
    auth: Auth,
    Path(comment_id): Path<Uuid>,
    Json(request): Json<ModerationRequest>,
) -> Result<Json<CommentDto>, Response> {
    let approve = request.action == ModerationAction::Approve;
    let comment = state
        .comments
        .moderate_comment(&auth.actor(), &CommentId::from(comment_id), approve)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(comment.into()))
}

/// POST /api/v1/comments/{comment_id}/votes - Upvote or downvote
#[utoipa::path(
    post,
    path = "/api/v1/comments/{comment_id}/votes",
    params(("comment_id" = Uuid, Path, description = "Comment id")),
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Comment with its new score", body = CommentDto),
        (status = 400, description = "Vote value is not 1 or -1", body = ErrorResponse),
        (status = 403, description = "Own comment, or downvote privilege missing", body = ErrorResponse),
        (status = 404, description = "Comment not found", body = ErrorResponse),
        (status = 409, description = "Comment is not published", body = ErrorResponse),
        (status = 429, description = "Vote rate limit exceeded", body = ErrorResponse)
    ),
    tag = "community",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth, request), fields(user_id = %auth.user_id))]
pub async fn vote(
    State(state): State<PortalState>,
    auth: Auth,
    Path(comment_id): Path<Uuid>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<CommentDto>, Response> {
    let value = VoteValue::try_from(request.value).map_err(|message| {
        application_error_to_response(ApplicationError::Validation { message })
    })?;

    let comment = state
        .comments
        .vote(&auth.actor(), &CommentId::from(comment_id), value)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(comment.into()))
}

/// GET /api/v1/users/{user_id}/reputation - Score, level, and privileges
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/reputation",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Reputation summary", body = ReputationResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "community"
)]
pub async fn reputation(
    State(state): State<PortalState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ReputationResponse>, Response> {
    let summary = state
        .reputation
        .summary(&UserId::from(user_id))
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(summary.into()))
}

/// PUT /api/v1/reports/{report_id}/ratings - Rate a report, replacing any earlier rating
#[utoipa::path(
    put,
    path = "/api/v1/reports/{report_id}/ratings",
    params(("report_id" = Uuid, Path, description = "Audit report id")),
    request_body = RatingRequest,
    responses(
        (status = 200, description = "Stored rating", body = RatingDto),
        (status = 400, description = "Score outside 1 to 5", body = ErrorResponse),
        (status = 422, description = "Review rejected by the content filter", body = ErrorResponse),
        (status = 429, description = "Rating rate limit exceeded", body = ErrorResponse)
    ),
    tag = "community",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth, request), fields(user_id = %auth.user_id))]
pub async fn rate_report(
    State(state): State<PortalState>,
    auth: Auth,
    Path(report_id): Path<Uuid>,
    Json(request): Json<RatingRequest>,
) -> Result<Json<RatingDto>, Response> {
    let rating = state
        .ratings
        .rate_report(
            &auth.actor(),
            ReportId::from(report_id),
            request.score,
            request.review,
        )
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(rating.into()))
}

/// GET /api/v1/reports/{report_id}/ratings/summary - Published rating aggregate
#[utoipa::path(
    get,
    path = "/api/v1/reports/{report_id}/ratings/summary",
    params(("report_id" = Uuid, Path, description = "Audit report id")),
    responses(
        (status = 200, description = "Count, average, and star distribution", body = RatingSummaryResponse)
    ),
    tag = "community"
)]
pub async fn rating_summary(
    State(state): State<PortalState>,
    Path(report_id): Path<Uuid>,
) -> Result<Json<RatingSummaryResponse>, Response> {
    let summary = state
        .ratings
        .rating_summary(&ReportId::from(report_id))
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(RatingSummaryResponse::new(report_id, summary)))
}
