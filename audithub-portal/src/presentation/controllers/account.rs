//! Account endpoints: registration, profile, avatar, login history

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use tracing::instrument;
use uuid::Uuid;

use audithub_core::application::auth::ListLoginHistoryUseCase;
use audithub_core::domain::auth::value_objects::UserId;

use crate::presentation::auth::Auth;
use crate::presentation::controllers::PortalState;
use crate::presentation::middleware::application_error_to_response;
use crate::presentation::models::{
    ErrorResponse, LoginHistoryResponse, PaginationQuery, ProfileResponse, RegisterRequest,
};

/// POST /api/v1/account/register - Create a password account
#[utoipa::path(
    post,
    path = "/api/v1/account/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ProfileResponse),
        (status = 400, description = "Invalid email, username, or weak password", body = ErrorResponse),
        (status = 409, description = "Email or username already taken", body = ErrorResponse),
        (status = 429, description = "Too many registrations from this address", body = ErrorResponse)
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn register(
    State(state): State<PortalState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), Response> {
    let login = state
        .register_use_case
        .execute(request.email, request.username, request.password)
        .await
        .map_err(application_error_to_response)?;

    let avatar_url = state.connect.picture_url(&login);
    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse::from_login(&login, avatar_url)),
    ))
}

/// GET /api/v1/account/me - Current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/account/me",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    tag = "account",
    security(("bearer" = []))
)]
pub async fn me(
    State(state): State<PortalState>,
    auth: Auth,
) -> Result<Json<ProfileResponse>, Response> {
    let login = state
        .get_profile_use_case
        .execute(&auth.user_id)
        .await
        .map_err(application_error_to_response)?;

    let avatar_url = state.connect.picture_url(&login);
    Ok(Json(ProfileResponse::from_login(&login, avatar_url)))
}

/// GET /api/v1/account/logins - Recent sign-in attempts, newest first
#[utoipa::path(
    get,
    path = "/api/v1/account/logins",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Login history page", body = LoginHistoryResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    tag = "account",
    security(("bearer" = []))
)]
#[instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn login_history(
    State(state): State<PortalState>,
    auth: Auth,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<LoginHistoryResponse>, Response> {
    let entries = state
        .list_login_history_use_case
        .execute(&auth.user_id, query.limit, query.offset)
        .await
        .map_err(application_error_to_response)?;

    let limit = query
        .limit
        .unwrap_or(ListLoginHistoryUseCase::DEFAULT_LIMIT)
        .clamp(1, ListLoginHistoryUseCase::MAX_LIMIT);
    Ok(Json(LoginHistoryResponse {
        entries: entries.into_iter().map(Into::into).collect(),
        limit,
        offset: query.offset.unwrap_or(0),
    }))
}

/// GET /api/v1/users/{user_id}/avatar - Stored avatar image
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/avatar",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 404, description = "No such user or no avatar", body = ErrorResponse)
    ),
    tag = "account"
)]
pub async fn avatar(
    State(state): State<PortalState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, Response> {
    let avatar = state
        .get_avatar_use_case
        .execute(&UserId::from(user_id))
        .await
        .map_err(application_error_to_response)?;

    let content_type = HeaderValue::from_str(&avatar.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let mut response = avatar.bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=300"),
    );
    Ok(response)
}
