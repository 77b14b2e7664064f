//! Authentication extractors for Axum (bearer access tokens)

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use audithub_core::application::community::Actor;
use audithub_core::application::connect::ConnectService;
use audithub_core::application::errors::ApplicationError;
use audithub_core::domain::auth::errors::AuthError;
use audithub_core::domain::auth::value_objects::{UserId, UserRole};
use audithub_core::domain::connect::entities::AccessTokenClaims;

use crate::presentation::middleware::application_error_to_response;

/// State for authentication extractors, injected into request extensions
#[derive(Clone)]
pub struct AuthState {
    pub connect: Arc<ConnectService>,
}

/// Caller authenticated with a bearer access token
#[derive(Debug, Clone)]
pub struct Auth {
    pub user_id: UserId,
    pub roles: Vec<UserRole>,
    pub claims: AccessTokenClaims,
}

impl Auth {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.roles.clone())
    }
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = parts
            .extensions
            .get::<AuthState>()
            .cloned()
            .ok_or_else(|| AuthErrorResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: ApplicationError::Configuration {
                    message: "Auth state not found in request extensions".to_string(),
                },
            })?;

        let token = bearer_token(&parts.headers).ok_or_else(|| AuthErrorResponse {
            status: StatusCode::UNAUTHORIZED,
            error: AuthError::InvalidToken.into(),
        })?;

        let claims = auth_state
            .connect
            .validate_access_token(token)
            .await
            .map_err(|error| AuthErrorResponse {
                status: StatusCode::UNAUTHORIZED,
                error,
            })?;

        let user_id = claims.user_id().map_err(|_| AuthErrorResponse {
            status: StatusCode::UNAUTHORIZED,
            error: AuthError::InvalidToken.into(),
        })?;
        let roles = claims
            .roles
            .iter()
            .filter_map(|r| r.parse::<UserRole>().ok())
            .collect();

        Ok(Auth {
            user_id,
            roles,
            claims,
        })
    }
}

/// Bearer authentication when present; anonymous otherwise
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<Auth>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Ok(OptionalAuth(None));
        }
        // A token that was sent but does not validate is still an error
        Auth::from_request_parts(parts, state)
            .await
            .map(|auth| OptionalAuth(Some(auth)))
    }
}

/// Rejection from the authentication extractors
#[derive(Debug)]
pub struct AuthErrorResponse {
    pub status: StatusCode,
    pub error: ApplicationError,
}

impl IntoResponse for AuthErrorResponse {
    fn into_response(self) -> Response {
        let mut response = application_error_to_response(self.error);
        // Anything that fails validation is a 401 here, whatever the cause
        if self.status == StatusCode::UNAUTHORIZED && !response.status().is_server_error() {
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            response
                .headers_mut()
                .entry(header::WWW_AUTHENTICATE)
                .or_insert(axum::http::HeaderValue::from_static("Bearer"));
        }
        response
    }
}
