//! HTTP middleware and error rendering for the portal

pub mod rate_limit;

pub use rate_limit::{
    EarlyAuthInfo, RateLimiterState, auth_rate_limit_middleware, early_auth_middleware,
    extract_ip, rate_limit_middleware,
};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;

use audithub_core::application::errors::ApplicationError;
use audithub_core::config::SecurityConfig;
use audithub_core::domain::auth::errors::AuthError;
use audithub_core::domain::community::errors::CommunityError;
use audithub_core::domain::connect::errors::ConnectError;
use audithub_core::domain::sso::errors::SsoError;

use crate::presentation::auth::AuthState;
use crate::presentation::models::{ErrorResponse, OAuthErrorResponse};

static SANITIZE_ERRORS: AtomicBool = AtomicBool::new(true);

/// Whether 5xx bodies hide the underlying error. Set once from config when
/// the router is built.
pub fn set_error_sanitization(enabled: bool) {
    SANITIZE_ERRORS.store(enabled, Ordering::Relaxed);
}

fn sanitize_errors() -> bool {
    SANITIZE_ERRORS.load(Ordering::Relaxed)
}

/// Status, code and client-facing message for an application error
fn classify(error: &ApplicationError) -> (StatusCode, &'static str, String) {
    let internal = || {
        if sanitize_errors() {
            "An internal error occurred".to_string()
        } else {
            "Internal server error".to_string()
        }
    };

    match error {
        ApplicationError::Authentication(auth) => {
            let (status, code) = match auth {
                AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
                AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
                AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
                AuthError::EmailAlreadyExists { .. } => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
                AuthError::UsernameTaken { .. } => (StatusCode::CONFLICT, "USERNAME_TAKEN"),
                AuthError::InvalidEmail { .. } => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
                AuthError::InvalidUsername { .. } => (StatusCode::BAD_REQUEST, "INVALID_USERNAME"),
                AuthError::PasswordRequirementsNotMet { .. } => {
                    (StatusCode::BAD_REQUEST, "WEAK_PASSWORD")
                }
                AuthError::AccountLocked { .. } => (StatusCode::LOCKED, "ACCOUNT_LOCKED"),
                AuthError::UserIdNotFound { .. } => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                AuthError::InsufficientPermissions => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                AuthError::DatabaseError { .. } | AuthError::HashingFailed => {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", internal());
                }
            };
            (status, code, auth.to_string())
        }
        ApplicationError::Connect(connect) => (
            oauth_status(connect),
            connect.code(),
            connect.description().to_string(),
        ),
        ApplicationError::Sso(sso) => {
            let (status, code) = match sso {
                SsoError::ProviderUnavailable { .. } => {
                    (StatusCode::NOT_FOUND, "SSO_PROVIDER_UNAVAILABLE")
                }
                SsoError::InvalidState => (StatusCode::BAD_REQUEST, "SSO_INVALID_STATE"),
                SsoError::ProviderMismatch { .. } => {
                    (StatusCode::BAD_REQUEST, "SSO_PROVIDER_MISMATCH")
                }
                SsoError::ProviderDenied { .. } => (StatusCode::BAD_REQUEST, "SSO_PROVIDER_DENIED"),
                SsoError::ExchangeFailed { .. } => (StatusCode::BAD_GATEWAY, "SSO_EXCHANGE_FAILED"),
                SsoError::EmailNotVerified => (StatusCode::FORBIDDEN, "SSO_EMAIL_NOT_VERIFIED"),
                SsoError::AvatarRejected { .. } => (StatusCode::BAD_REQUEST, "SSO_AVATAR_REJECTED"),
            };
            (status, code, sso.to_string())
        }
        ApplicationError::Community(community) => {
            let (status, code) = match community {
                CommunityError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                CommunityError::PermissionDenied { .. } => {
                    (StatusCode::FORBIDDEN, "PERMISSION_DENIED")
                }
                CommunityError::InsufficientReputation { .. } => {
                    (StatusCode::FORBIDDEN, "INSUFFICIENT_REPUTATION")
                }
                CommunityError::ContentRejected { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "CONTENT_REJECTED")
                }
                CommunityError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                CommunityError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
                CommunityError::DatabaseError { .. } => {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", internal());
                }
            };
            (status, code, community.to_string())
        }
        ApplicationError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", error.to_string())
        }
        ApplicationError::Validation { message } => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
        }
        ApplicationError::RateLimited { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", error.to_string())
        }
        ApplicationError::Database { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", internal())
        }
        ApplicationError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR", internal()),
        ApplicationError::Configuration { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIGURATION_ERROR",
            if sanitize_errors() {
                "Service temporarily unavailable".to_string()
            } else {
                "Service configuration error".to_string()
            },
        ),
        ApplicationError::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", internal()),
    }
}

/// Convert ApplicationError to HTTP response
pub fn application_error_to_response(error: ApplicationError) -> Response {
    if let ApplicationError::Connect(connect) = &error {
        return oauth_error_response(connect);
    }

    let (status, code, message) = classify(&error);

    if status.is_server_error() {
        tracing::error!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Application error mapped to HTTP response"
        );
    } else {
        tracing::warn!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Request rejected"
        );
    }

    let retry_after = match &error {
        ApplicationError::RateLimited { retry_after } => Some(*retry_after),
        ApplicationError::Authentication(AuthError::AccountLocked {
            retry_after_seconds,
        }) => Some(*retry_after_seconds),
        _ => None,
    };

    let details = match &error {
        ApplicationError::Community(CommunityError::ContentRejected { violations }) => {
            Some(serde_json::json!({ "violations": violations }))
        }
        ApplicationError::Community(CommunityError::InsufficientReputation { privilege }) => {
            Some(serde_json::json!({ "privilege": privilege }))
        }
        _ if retry_after.is_some() => Some(serde_json::json!({ "retry_after": retry_after })),
        _ if status.is_server_error() && sanitize_errors() => None,
        _ if status.is_server_error() => Some(serde_json::json!({ "error": error.to_string() })),
        _ => None,
    };

    let error_response = ErrorResponse {
        code: code.to_string(),
        message,
        details,
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
    };

    let mut response = (status, Json(error_response)).into_response();
    if let Some(seconds) = retry_after
        && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
    {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    if status == StatusCode::UNAUTHORIZED
        && matches!(
            error,
            ApplicationError::Authentication(
                AuthError::InvalidToken | AuthError::TokenExpired | AuthError::TokenRevoked
            )
        )
    {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer error=\"invalid_token\""),
        );
    }
    response
}

fn oauth_status(error: &ConnectError) -> StatusCode {
    match error {
        ConnectError::InvalidClient(_) => StatusCode::UNAUTHORIZED,
        ConnectError::AccessDenied(_) => StatusCode::FORBIDDEN,
        ConnectError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ConnectError::TemporarilyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// RFC 6749 §5.2 error body. Token endpoint responses are never cached.
pub fn oauth_error_response(error: &ConnectError) -> Response {
    let status = oauth_status(error);
    if status.is_server_error() {
        tracing::error!(error = %error, "OAuth request failed");
    } else {
        tracing::warn!(error_code = error.code(), "OAuth request rejected");
    }

    let description = if status.is_server_error() && sanitize_errors() {
        None
    } else {
        Some(error.description().to_string()).filter(|d| !d.is_empty())
    };

    let mut response = (
        status,
        Json(OAuthErrorResponse {
            error: error.code().to_string(),
            error_description: description,
        }),
    )
        .into_response();
    no_store(&mut response);
    response
}

/// `Cache-Control: no-store` and `Pragma: no-cache` (RFC 6749 §5.1)
pub fn no_store(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}

/// 302 Found to `location`
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => application_error_to_response(ApplicationError::Configuration {
            message: "redirect location is not a valid header value".into(),
        }),
    }
}

/// Security headers middleware
pub async fn security_headers_middleware(
    State(security): State<Arc<SecurityConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let hsts = if security.hsts_include_subdomains {
        format!("max-age={}; includeSubDomains", security.hsts_max_age)
    } else {
        format!("max-age={}", security.hsts_max_age)
    };
    if let Ok(value) = HeaderValue::from_str(&hsts) {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, value);
    }

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    // Swagger UI needs inline scripts and styles
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; frame-ancestors 'none';",
        ),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
    );

    response
}

/// HTTPS enforcement middleware
pub async fn https_enforcement_middleware(request: Request, next: Next) -> Response {
    let is_https = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or_else(|| request.uri().scheme_str() == Some("https"));

    if !is_https
        && let Some(host) = request
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
    {
        let https_url = format!(
            "https://{}{}",
            host,
            request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/")
        );
        return Redirect::permanent(&https_url).into_response();
    }

    next.run(request).await
}

/// Request logging middleware with timing and request ID.
///
/// Only the path is logged; query strings carry codes and states.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Processing request"
    );

    let response = next.run(request).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = %response.status(),
        duration_ms = start_time.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Makes [`AuthState`] available to the bearer extractors
pub async fn inject_auth_state_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth_state);
    next.run(request).await
}
