//! Rate limiting middleware around the core `RateLimiterService`
//!
//! - `early_auth_middleware` identifies bearer callers so they draw from the
//!   authenticated tier
//! - `rate_limit_middleware` applies the tiered token bucket
//! - `auth_rate_limit_middleware` applies the sliding-window brute-force
//!   limiter to credential endpoints

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use audithub_core::infrastructure::rate_limiter::{AuthEndpoint, RateLimiterService, RequestCost};

use crate::presentation::auth::{AuthState, bearer_token};
use crate::presentation::models::ErrorResponse;

/// Shared state for rate limiting middleware
#[derive(Clone)]
pub struct RateLimiterState {
    pub service: Arc<RateLimiterService>,
}

impl RateLimiterState {
    pub fn new(service: Arc<RateLimiterService>) -> Self {
        Self { service }
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("enabled", &self.service.is_enabled())
            .finish()
    }
}

/// Caller identity resolved before rate limiting
#[derive(Debug, Clone, Default)]
pub struct EarlyAuthInfo {
    pub user_id: Option<Uuid>,
}

/// Resolve a bearer token into [`EarlyAuthInfo`].
///
/// Invalid tokens are treated as anonymous here; the extractor on the
/// handler rejects them.
pub async fn early_auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut auth_info = EarlyAuthInfo::default();

    if let Some(token) = bearer_token(request.headers())
        && let Ok(claims) = auth_state.connect.validate_access_token(token).await
        && let Ok(user_id) = claims.user_id()
    {
        auth_info.user_id = Some(user_id.as_uuid());
    }

    request.extensions_mut().insert(auth_info);
    next.run(request).await
}

/// Client IP from proxy headers
pub fn extract_ip(headers: &axum::http::HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Routes that should be excluded from rate limiting
const RATE_LIMIT_EXCLUDED_PATHS: &[&str] = &["/docs", "/api-docs", "/health", "/favicon.ico"];

/// Credential routes with brute-force protection
const AUTH_RATE_LIMIT_PATHS: &[(&str, AuthEndpoint)] = &[
    ("/connect/login", AuthEndpoint::Login),
    ("/api/v1/account/register", AuthEndpoint::Register),
];

fn should_skip_rate_limit(path: &str) -> bool {
    RATE_LIMIT_EXCLUDED_PATHS
        .iter()
        .any(|excluded| path.starts_with(excluded))
}

pub(crate) fn auth_endpoint_for(path: &str) -> Option<AuthEndpoint> {
    AUTH_RATE_LIMIT_PATHS
        .iter()
        .find(|(p, _)| path == *p)
        .map(|(_, endpoint)| *endpoint)
}

/// Add IETF draft rate limit headers
/// (draft-ietf-httpapi-ratelimit-headers)
fn add_rate_limit_headers(response: &mut Response, limit: u32, remaining: u32, reset_at: u64) {
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_at));
}

fn too_many_requests(code: &str, message: String, details: serde_json::Value, retry_after: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse {
            code: code.to_string(),
            message,
            details: Some(details),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Tiered token bucket: authenticated callers by user id, everyone else by IP.
/// Writes cost more than reads.
pub async fn rate_limit_middleware(
    State(state): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.service.is_enabled() || should_skip_rate_limit(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = extract_ip(request.headers());
    let user_id = request
        .extensions()
        .get::<EarlyAuthInfo>()
        .and_then(|info| info.user_id);
    let cost = RequestCost::from_method(request.method().as_str());

    let result = state.service.check_api_limit(&ip, user_id, cost).await;

    if result.allowed {
        let mut response = next.run(request).await;
        add_rate_limit_headers(&mut response, result.limit, result.remaining, result.reset_at);
        return response;
    }

    let retry_after = result.retry_after.unwrap_or(60);
    tracing::warn!(
        ip = %ip,
        tier = %result.tier,
        retry_after,
        "Rate limit exceeded"
    );

    let mut response = too_many_requests(
        "RATE_LIMIT_EXCEEDED",
        format!(
            "Rate limit exceeded. Please retry after {} seconds.",
            retry_after
        ),
        serde_json::json!({
            "retry_after": retry_after,
            "limit": result.limit,
            "tier": result.tier.as_str(),
        }),
        retry_after,
    );
    add_rate_limit_headers(&mut response, result.limit, 0, result.reset_at);
    response
}

/// Sliding-window brute-force limiter on credential endpoints
pub async fn auth_rate_limit_middleware(
    State(state): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.service.is_enabled() {
        return next.run(request).await;
    }
    let Some(endpoint) = auth_endpoint_for(request.uri().path()) else {
        return next.run(request).await;
    };

    let ip = extract_ip(request.headers());
    let result = state.service.check_auth_limit(&ip, endpoint).await;
    if result.allowed {
        return next.run(request).await;
    }

    let retry_after = result.retry_after();
    tracing::warn!(
        ip = %ip,
        endpoint = endpoint.as_str(),
        lockout_until = result.lockout_until.unwrap_or(0),
        "Auth rate limit exceeded"
    );

    too_many_requests(
        "AUTH_RATE_LIMIT_EXCEEDED",
        format!(
            "Too many {} attempts. Please try again later.",
            endpoint.as_str()
        ),
        serde_json::json!({
            "retry_after": retry_after,
            "endpoint": endpoint.as_str(),
        }),
        retry_after,
    )
}
