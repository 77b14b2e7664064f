//! OpenID Connect endpoints: authorize, login, token, revoke, userinfo, discovery

use axum::{
    Form,
    extract::{Path, Query, State, rejection::FormRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::instrument;

use audithub_core::application::connect::{
    AuthorizeParams, DiscoveryDocument, RevokeRequest, TokenRequest,
};
use audithub_core::domain::connect::errors::ConnectError;

use crate::presentation::auth::Auth;
use crate::presentation::controllers::{PortalState, login_context};
use crate::presentation::middleware::{
    application_error_to_response, found, no_store, oauth_error_response,
};
use crate::presentation::models::{
    AuthorizationRequestResponse, AuthorizeQuery, ErrorResponse, LoginRedirectResponse,
    OAuthErrorResponse, PasswordLoginRequest, RevokeForm, TokenForm, TokenResponse,
    UserInfoResponse,
};

/// GET /connect/authorize - Start an authorization code flow
#[utoipa::path(
    get,
    path = "/connect/authorize",
    params(AuthorizeQuery),
    responses(
        (status = 302, description = "To the login page, or back to the client with an error"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = OAuthErrorResponse)
    ),
    tag = "connect"
)]
#[instrument(skip_all, fields(client_id = ?query.client_id))]
pub async fn authorize(
    State(state): State<PortalState>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let params = AuthorizeParams {
        response_type: query.response_type,
        client_id: query.client_id,
        redirect_uri: query.redirect_uri,
        scope: query.scope,
        state: query.state,
        nonce: query.nonce,
        code_challenge: query.code_challenge,
        code_challenge_method: query.code_challenge_method,
    };

    match state.connect.authorize(params).await {
        Ok(location) => found(&location),
        Err(rejection) => match rejection.redirect_location() {
            Some(location) => {
                tracing::info!(error = rejection.error.code(), "Authorization request rejected");
                found(&location)
            }
            None => {
                // Nothing to redirect to; the browser gets a plain 400
                let mut response = oauth_error_response(&rejection.error);
                *response.status_mut() = StatusCode::BAD_REQUEST;
                response
            }
        },
    }
}

/// GET /connect/authorize/{request_id} - Describe a pending authorization
#[utoipa::path(
    get,
    path = "/connect/authorize/{request_id}",
    params(("request_id" = String, Path, description = "Pending request id")),
    responses(
        (status = 200, description = "Pending request", body = AuthorizationRequestResponse),
        (status = 404, description = "Unknown or expired request", body = ErrorResponse)
    ),
    tag = "connect"
)]
pub async fn describe_request(
    State(state): State<PortalState>,
    Path(request_id): Path<String>,
) -> Result<Json<AuthorizationRequestResponse>, Response> {
    let description = state
        .connect
        .describe_request(&request_id)
        .await
        .map_err(application_error_to_response)?;

    Ok(Json(AuthorizationRequestResponse {
        client_name: description.client_name,
        scopes: description
            .scopes
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
    }))
}

/// POST /connect/login - Password step of a pending authorization
#[utoipa::path(
    post,
    path = "/connect/login",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Authenticated; follow redirect_to", body = LoginRedirectResponse),
        (status = 400, description = "Unknown or expired request", body = OAuthErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 423, description = "Account locked", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "connect"
)]
#[instrument(skip_all)]
pub async fn password_login(
    State(state): State<PortalState>,
    headers: HeaderMap,
    Json(request): Json<PasswordLoginRequest>,
) -> Result<Json<LoginRedirectResponse>, Response> {
    let redirect_to = state
        .connect
        .password_login(
            &request.request_id,
            &request.email,
            request.password,
            login_context(&headers),
        )
        .await
        .map_err(application_error_to_response)?;

    Ok(Json(LoginRedirectResponse { redirect_to }))
}

/// POST /connect/token - Exchange a code or refresh token
#[utoipa::path(
    post,
    path = "/connect/token",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "OAuth error", body = OAuthErrorResponse),
        (status = 401, description = "Client authentication failed", body = OAuthErrorResponse)
    ),
    tag = "connect"
)]
pub async fn token(
    State(state): State<PortalState>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return oauth_error_response(&ConnectError::InvalidRequest(rejection.body_text()));
        }
    };

    let request = TokenRequest {
        grant_type: form.grant_type,
        client_id: form.client_id,
        client_secret: form.client_secret,
        code: form.code,
        redirect_uri: form.redirect_uri,
        code_verifier: form.code_verifier,
        refresh_token: form.refresh_token,
        scope: form.scope,
    };

    match state.connect.exchange_token(request).await {
        Ok(tokens) => {
            let mut response = Json(TokenResponse::from(tokens)).into_response();
            no_store(&mut response);
            response
        }
        Err(error) => oauth_error_response(&error),
    }
}

/// POST /connect/revoke - Revoke a refresh or access token (RFC 7009)
#[utoipa::path(
    post,
    path = "/connect/revoke",
    request_body(content = RevokeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Revoked, or the token was unknown"),
        (status = 400, description = "OAuth error", body = OAuthErrorResponse),
        (status = 401, description = "Client authentication failed", body = OAuthErrorResponse)
    ),
    tag = "connect"
)]
pub async fn revoke(
    State(state): State<PortalState>,
    form: Result<Form<RevokeForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return oauth_error_response(&ConnectError::InvalidRequest(rejection.body_text()));
        }
    };

    let request = RevokeRequest {
        token: form.token,
        token_type_hint: form.token_type_hint,
        client_id: form.client_id,
        client_secret: form.client_secret,
    };

    match state.connect.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => oauth_error_response(&error),
    }
}

/// GET /connect/userinfo - Claims for the bearer token's subject
#[utoipa::path(
    get,
    path = "/connect/userinfo",
    responses(
        (status = 200, description = "Scope-filtered claims", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    tag = "connect",
    security(("bearer" = []))
)]
pub async fn userinfo(
    State(state): State<PortalState>,
    auth: Auth,
) -> Result<Json<UserInfoResponse>, Response> {
    let info = state
        .connect
        .userinfo(&auth.claims)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(info.into()))
}

/// GET /.well-known/openid-configuration - Provider metadata
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    responses(
        (status = 200, description = "OpenID provider metadata", body = DiscoveryDocument)
    ),
    tag = "connect"
)]
pub async fn discovery(State(state): State<PortalState>) -> Json<DiscoveryDocument> {
    Json(state.connect.discovery())
}
