//! Router harness for audithub-portal integration tests
//!
//! The full middleware stack runs against in-memory repositories, the moka
//! cache, in-memory rate limit storage, and scripted SSO providers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use audithub_core::Config;
use audithub_core::application::sso::{AvatarFetcher, SsoProvider};
use audithub_core::config::{ClientConfig, ConnectConfig, RateLimitStorageBackend, TierLimitConfig};
use audithub_core::domain::auth::entities::Avatar;
use audithub_core::domain::auth::value_objects::{Email, UserRole};
use audithub_core::domain::auth::repositories::ILoginRepository;
use audithub_core::domain::connect::value_objects::CodeChallenge;
use audithub_core::domain::sso::{ExternalIdentity, ProviderKind, SsoError};
use audithub_core::infrastructure::auth::PasswordHasher;
use audithub_core::infrastructure::cache::CacheServiceImpl;
use audithub_core::infrastructure::memory::InMemoryLoginRepository;
use audithub_core::infrastructure::rate_limiter::{InMemoryRateLimitStorage, RateLimiterService};
use audithub_portal::{PortalDependencies, PortalState, Repositories, create_router};

pub const CLIENT_ID: &str = "portal";
pub const REDIRECT: &str = "https://portal.test/cb";
pub const LOGIN_PAGE: &str = "https://portal.test/login";
pub const ISSUER: &str = "https://id.audithub.test";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
pub const STATE: &str = "af0ifjsldkj";
pub const PASSWORD: &str = "correct-horse-9";
pub const JWT_SECRET: &str = "integration-secret-key-at-least-32-chars";

/// Provider double that hands back a scripted identity
pub struct FakeProvider {
    kind: ProviderKind,
    identity: Mutex<Result<ExternalIdentity, SsoError>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            identity: Mutex::new(Err(SsoError::ExchangeFailed {
                message: "no identity scripted".into(),
            })),
        }
    }

    pub fn will_return(&self, identity: Result<ExternalIdentity, SsoError>) {
        *self.identity.lock().unwrap() = identity;
    }
}

#[async_trait]
impl SsoProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authorization_url(&self, state: &str, code_challenge: &CodeChallenge) -> String {
        format!(
            "https://idp.fake/{}/auth?state={}&code_challenge={}",
            self.kind,
            state,
            code_challenge.as_str()
        )
    }

    async fn exchange_code(&self, _code: &str, _code_verifier: &str) -> Result<String, SsoError> {
        Ok("provider-access-token".into())
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<ExternalIdentity, SsoError> {
        self.identity.lock().unwrap().clone()
    }
}

/// Counts downloads and serves a tiny PNG
#[derive(Default)]
pub struct FakeAvatars {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AvatarFetcher for FakeAvatars {
    async fn fetch(&self, _url: &str) -> Result<Avatar, SsoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Avatar {
            content_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub logins: Arc<InMemoryLoginRepository>,
    pub google: Arc<FakeProvider>,
    pub avatars: Arc<FakeAvatars>,
}

fn generous_tier() -> TierLimitConfig {
    TierLimitConfig {
        requests_per_minute: 10_000,
        requests_per_hour: 100_000,
        burst_size: 1_000,
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.into();
    config.connect = ConnectConfig {
        issuer: ISSUER.into(),
        login_page_url: LOGIN_PAGE.into(),
        clients: vec![ClientConfig {
            client_id: CLIENT_ID.into(),
            name: "Portal".into(),
            client_secret: None,
            redirect_uris: vec![REDIRECT.into()],
            allowed_scopes: vec![
                "openid".into(),
                "email".into(),
                "profile".into(),
                "offline_access".into(),
            ],
        }],
        ..ConnectConfig::default()
    };
    config.moderation.banned_terms = vec!["scam".into()];

    let rate_limit = &mut config.server.rate_limit;
    rate_limit.storage_backend = RateLimitStorageBackend::Memory;
    rate_limit.tiers.anonymous = generous_tier();
    rate_limit.tiers.authenticated = generous_tier();
    rate_limit.auth_protection.register_attempts_per_minute = 100;
    rate_limit.auth_protection.register_attempts_per_hour = 1_000;
    config
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: Config) -> TestApp {
    let logins = Arc::new(InMemoryLoginRepository::new());
    let google = Arc::new(FakeProvider::new(ProviderKind::Google));
    let discord = Arc::new(FakeProvider::new(ProviderKind::Discord));
    let avatars = Arc::new(FakeAvatars::default());

    let deps = PortalDependencies {
        repositories: Repositories {
            logins: logins.clone(),
            ..Repositories::in_memory()
        },
        cache: Arc::new(CacheServiceImpl::memory(10_000)),
        rate_limiter: Arc::new(RateLimiterService::with_storage(
            Arc::new(InMemoryRateLimitStorage::new()),
            config.server.rate_limit.clone(),
        )),
        providers: vec![google.clone() as Arc<dyn SsoProvider>, discord],
        avatars: avatars.clone(),
        password_hasher: Arc::new(PasswordHasher::with_params(4096, 1, 1).unwrap()),
    };

    let state = PortalState::build(&config, deps).expect("portal state should build");
    TestApp {
        router: create_router(state, Arc::new(config)),
        logins,
        google,
        avatars,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register a password account and return its profile
    pub async fn register(&self, email: &str, username: &str) -> Value {
        let response = self
            .send(post_json(
                "/api/v1/account/register",
                serde_json::json!({ "email": email, "username": username, "password": PASSWORD }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json(response).await
    }

    pub async fn grant_role(&self, email: &str, role: UserRole) {
        let email = Email::new(email.to_string()).unwrap();
        let mut login = self.logins.find_by_email(&email).await.unwrap().unwrap();
        login.add_role(role);
        self.logins.update(&login).await.unwrap();
    }

    /// Start an authorization and return the pending request id
    pub async fn authorize(&self, scope: &str) -> String {
        let response = self.send(get(&authorize_uri(scope), None)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = location(&response);
        assert!(location.starts_with(LOGIN_PAGE));
        query(&location)["request_id"].clone()
    }

    /// Password step; returns the client redirect
    pub async fn password_login(&self, request_id: &str, email: &str, password: &str) -> Response {
        self.send(post_json(
            "/connect/login",
            serde_json::json!({ "request_id": request_id, "email": email, "password": password }),
            None,
        ))
        .await
    }

    /// Full authorization code flow; returns the authorization code
    pub async fn authorization_code(&self, email: &str, scope: &str) -> String {
        let request_id = self.authorize(scope).await;
        let response = self.password_login(&request_id, email, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        let redirect = body["redirect_to"].as_str().unwrap();
        assert!(redirect.starts_with(REDIRECT));
        let params = query(redirect);
        assert_eq!(params["state"], STATE);
        params["code"].clone()
    }

    pub async fn exchange_code(&self, code: &str) -> Response {
        self.send(post_form(
            "/connect/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", CLIENT_ID),
                ("code", code),
                ("redirect_uri", REDIRECT),
                ("code_verifier", VERIFIER),
            ],
        ))
        .await
    }

    /// Register, sign in, and return the token response
    pub async fn sign_in(&self, email: &str, scope: &str) -> Value {
        let code = self.authorization_code(email, scope).await;
        let response = self.exchange_code(&code).await;
        assert_eq!(response.status(), StatusCode::OK);
        json(response).await
    }

    pub async fn access_token(&self, email: &str) -> String {
        let tokens = self.sign_in(email, "openid email profile").await;
        tokens["access_token"].as_str().unwrap().to_string()
    }
}

pub fn authorize_uri(scope: &str) -> String {
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT),
        ("scope", scope),
        ("state", STATE),
        ("nonce", "n-0S6_WzA2Mj"),
        ("code_challenge", CHALLENGE),
        ("code_challenge_method", "S256"),
    ])
    .unwrap();
    format!("/connect/authorize?{query}")
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    with_json("POST", uri, body, token)
}

pub fn put_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    with_json("PUT", uri, body, token)
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

pub async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect should carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query(location: &str) -> HashMap<String, String> {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

pub fn identity(provider: ProviderKind, subject: &str, email: &str, name: &str) -> ExternalIdentity {
    ExternalIdentity {
        provider,
        subject: subject.into(),
        email: Some(email.into()),
        email_verified: true,
        display_name: Some(name.into()),
        avatar_url: Some("https://lh3.googleusercontent.com/a/photo.png".into()),
    }
}
