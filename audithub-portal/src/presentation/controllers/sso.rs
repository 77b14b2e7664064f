//! Federated sign-in through Google and Discord

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use tracing::instrument;

use audithub_core::application::errors::ApplicationError;
use audithub_core::application::sso::CallbackParams;

use crate::presentation::controllers::{PortalState, login_context};
use crate::presentation::middleware::{application_error_to_response, found};
use crate::presentation::models::{ErrorResponse, SsoBeginQuery, SsoCallbackQuery};

/// GET /connect/sso/{provider} - Leave for the upstream provider
#[utoipa::path(
    get,
    path = "/connect/sso/{provider}",
    params(
        ("provider" = String, Path, description = "google or discord"),
        SsoBeginQuery
    ),
    responses(
        (status = 302, description = "To the provider's consent page"),
        (status = 400, description = "Missing request_id", body = ErrorResponse),
        (status = 404, description = "Provider not configured, or request expired", body = ErrorResponse)
    ),
    tag = "sso"
)]
#[instrument(skip(state, query))]
pub async fn begin(
    State(state): State<PortalState>,
    Path(provider): Path<String>,
    Query(query): Query<SsoBeginQuery>,
) -> Result<Response, Response> {
    let request_id = query
        .request_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            application_error_to_response(ApplicationError::Validation {
                message: "request_id is required".to_string(),
            })
        })?;

    let location = state
        .sso
        .begin(&provider, &request_id)
        .await
        .map_err(application_error_to_response)?;
    Ok(found(&location))
}

/// GET /connect/sso/{provider}/callback - Return leg from the provider
#[utoipa::path(
    get,
    path = "/connect/sso/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google or discord"),
        SsoCallbackQuery
    ),
    responses(
        (status = 302, description = "Back to the client with a code or an OAuth error"),
        (status = 400, description = "Unknown state or provider mismatch", body = ErrorResponse),
        (status = 403, description = "Provider email is not verified", body = ErrorResponse),
        (status = 502, description = "Provider exchange failed", body = ErrorResponse)
    ),
    tag = "sso"
)]
#[instrument(skip(state, headers, query))]
pub async fn callback(
    State(state): State<PortalState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SsoCallbackQuery>,
) -> Result<Response, Response> {
    let params = CallbackParams {
        code: query.code,
        state: query.state,
        error: query.error,
        error_description: query.error_description,
    };

    let location = state
        .sso
        .callback(&provider, params, login_context(&headers))
        .await
        .map_err(application_error_to_response)?;
    Ok(found(&location))
}
