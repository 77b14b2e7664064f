//! Route definitions and server setup

use axum::http::{HeaderName, Method, StatusCode, header};
use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use audithub_core::Config;

use crate::presentation::{
    controllers::{
        PortalState,
        account::{avatar, login_history, me, register},
        community::{
            delete_comment, list_comments, moderate_comment, post_comment, rate_report,
            rating_summary, reputation, vote,
        },
        connect::{authorize, describe_request, discovery, password_login, revoke, token, userinfo},
        health::health_check,
        sso,
    },
    middleware::{
        RateLimiterState, auth_rate_limit_middleware, early_auth_middleware,
        https_enforcement_middleware, inject_auth_state_middleware, logging_middleware,
        rate_limit_middleware, security_headers_middleware, set_error_sanitization,
    },
    models::*,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::connect::discovery,
        crate::presentation::controllers::connect::authorize,
        crate::presentation::controllers::connect::describe_request,
        crate::presentation::controllers::connect::password_login,
        crate::presentation::controllers::connect::token,
        crate::presentation::controllers::connect::revoke,
        crate::presentation::controllers::connect::userinfo,
        crate::presentation::controllers::sso::begin,
        crate::presentation::controllers::sso::callback,
        crate::presentation::controllers::account::register,
        crate::presentation::controllers::account::me,
        crate::presentation::controllers::account::login_history,
        crate::presentation::controllers::account::avatar,
        crate::presentation::controllers::community::list_comments,
        crate::presentation::controllers::community::post_comment,
        crate::presentation::controllers::community::delete_comment,
        crate::presentation::controllers::community::moderate_comment,
        crate::presentation::controllers::community::vote,
        crate::presentation::controllers::community::reputation,
        crate::presentation::controllers::community::rate_report,
        crate::presentation::controllers::community::rating_summary,
        crate::presentation::controllers::health::health_check
    ),
    components(
        schemas(
            ErrorResponse,
            OAuthErrorResponse,
            HealthResponse,
            AuthorizationRequestResponse,
            PasswordLoginRequest,
            LoginRedirectResponse,
            TokenForm,
            TokenResponse,
            RevokeForm,
            UserInfoResponse,
            RegisterRequest,
            ProfileResponse,
            LoginHistoryEntryDto,
            LoginHistoryResponse,
            ReputationEventDto,
            ReputationResponse,
            CreateCommentRequest,
            CommentDto,
            CommentListResponse,
            ModerationAction,
            ModerationRequest,
            VoteRequest,
            RatingRequest,
            RatingDto,
            RatingSummaryResponse,
            audithub_core::application::connect::DiscoveryDocument,
            audithub_core::domain::auth::value_objects::UserRole,
            audithub_core::domain::community::value_objects::ContentStatus,
            audithub_core::domain::community::value_objects::ReputationEventKind,
            audithub_core::domain::community::value_objects::ReputationLevel,
            audithub_core::domain::community::value_objects::Privilege
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "connect", description = "OpenID Connect provider: authorization code with PKCE, tokens, userinfo"),
        (name = "sso", description = "Sign-in through Google and Discord"),
        (name = "account", description = "Registration, profile, avatar, and login history"),
        (name = "community", description = "Comments, votes, ratings, and reputation on audit reports"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "AuditHub API",
        version = "0.3.0",
        description = "Identity provider and community feedback API for published security audit reports.",
        license(
            name = "AGPL-3.0",
            url = "https://www.gnu.org/licenses/agpl-3.0.html"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::USER_AGENT,
        header::ORIGIN,
        header::ACCESS_CONTROL_REQUEST_METHOD,
        header::ACCESS_CONTROL_REQUEST_HEADERS,
    ];
    let exposed = [
        header::RETRY_AFTER,
        header::WWW_AUTHENTICATE,
        HeaderName::from_static("ratelimit-limit"),
        HeaderName::from_static("ratelimit-remaining"),
        HeaderName::from_static("ratelimit-reset"),
    ];

    let origins = &config.server.allowed_origins;
    if origins.len() == 1 && origins[0] == "*" {
        // Bearer tokens only; wildcard origins cannot carry credentials
        tracing::warn!("CORS: Using wildcard origin (*). Configure specific origins for production.");
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers)
            .expose_headers(exposed)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600))
    } else {
        tracing::debug!("CORS: Configured with specific origins");
        let origins: Vec<axum::http::HeaderValue> = origins
            .iter()
            .filter_map(|origin| {
                axum::http::HeaderValue::from_str(origin)
                    .map_err(|_| {
                        tracing::warn!(origin, "Invalid CORS origin in config; skipping");
                    })
                    .ok()
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .expose_headers(exposed)
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    }
}

/// Create the application router with its middleware stack
pub fn create_router(state: PortalState, config: Arc<Config>) -> Router {
    set_error_sanitization(config.server.security.sanitize_errors);

    let connect_routes = Router::new()
        .route("/.well-known/openid-configuration", get(discovery))
        .route("/connect/authorize", get(authorize))
        .route("/connect/authorize/{request_id}", get(describe_request))
        .route("/connect/login", post(password_login))
        .route("/connect/token", post(token))
        .route("/connect/revoke", post(revoke))
        .route("/connect/userinfo", get(userinfo))
        .route("/connect/sso/{provider}", get(sso::begin))
        .route("/connect/sso/{provider}/callback", get(sso::callback));

    let api_routes = Router::new()
        .route("/account/register", post(register))
        .route("/account/me", get(me))
        .route("/account/logins", get(login_history))
        .route("/users/{user_id}/avatar", get(avatar))
        .route("/users/{user_id}/reputation", get(reputation))
        .route(
            "/reports/{report_id}/comments",
            get(list_comments).post(post_comment),
        )
        .route("/reports/{report_id}/ratings", put(rate_report))
        .route("/reports/{report_id}/ratings/summary", get(rating_summary))
        .route("/comments/{comment_id}", delete(delete_comment))
        .route("/comments/{comment_id}/moderation", post(moderate_comment))
        .route("/comments/{comment_id}/votes", post(vote));

    async fn root_handler() -> Response {
        axum::Json(serde_json::json!({
            "name": "AuditHub API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "discovery": "/.well-known/openid-configuration",
                "health": "/health",
                "api": "/api/v1",
                "docs": "/docs"
            }
        }))
        .into_response()
    }

    let health_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check));

    let mut router = Router::new()
        .merge(connect_routes)
        .nest("/api/v1", api_routes)
        .merge(health_routes);

    // Keep docs out of hardened deployments
    if config.server.enable_docs {
        router =
            router.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let auth_state = state.auth_state();
    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_seconds),
        ))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            inject_auth_state_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware));

    if config.server.security.enable_security_headers {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(config.server.security.clone()),
            security_headers_middleware,
        ));
    }

    if config.server.security.enforce_https {
        router = router.layer(middleware::from_fn(https_enforcement_middleware));
    }

    // Layers run outermost-first: early auth, then the API bucket, then the
    // credential limiter
    if state.rate_limiter.is_enabled() {
        let rate_limiter_state = RateLimiterState::new(Arc::clone(&state.rate_limiter));
        router = router
            .layer(middleware::from_fn_with_state(
                rate_limiter_state.clone(),
                auth_rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                rate_limiter_state,
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                auth_state,
                early_auth_middleware,
            ));
    }

    router.layer(service_builder).with_state(state)
}
