//! Shared wiring for audithub-core integration tests
//!
//! Everything runs against the in-memory repositories and the moka cache.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use audithub_core::application::auth::{AuthenticatePasswordUseCase, LoginHistoryRecorder, RegisterUseCase};
use audithub_core::application::connect::{
    AuthorizeParams, ClientRegistry, ConnectComponents, ConnectService, ConnectSettings,
    TokenRequest,
};
use audithub_core::application::sso::{AvatarFetcher, SsoProvider, SsoService};
use audithub_core::config::{ClientConfig, ConnectConfig};
use audithub_core::domain::auth::entities::Avatar;
use audithub_core::domain::connect::value_objects::CodeChallenge;
use audithub_core::domain::sso::{ExternalIdentity, ProviderKind, SsoError};
use audithub_core::infrastructure::auth::{
    BruteForceConfig, CacheBruteForceProtection, CacheTokenBlacklistService, JwtService,
    PasswordHasher,
};
use audithub_core::infrastructure::cache::MemoryCache;
use audithub_core::infrastructure::connect::CacheAuthorizationSessionStore;
use audithub_core::infrastructure::memory::{
    InMemoryExternalLoginRepository, InMemoryLoginHistoryRepository, InMemoryLoginRepository,
    InMemoryRefreshTokenRepository,
};

pub const CLIENT_ID: &str = "portal";
pub const REDIRECT: &str = "https://portal.test/cb";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
pub const JWT_SECRET: &str = "integration-secret-key-at-least-32-chars";

/// Provider double that hands back a scripted identity
pub struct FakeProvider {
    kind: ProviderKind,
    identity: Mutex<Result<ExternalIdentity, SsoError>>,
    pub exchanged_verifiers: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            identity: Mutex::new(Err(SsoError::ExchangeFailed {
                message: "no identity scripted".into(),
            })),
            exchanged_verifiers: Mutex::new(Vec::new()),
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

    async fn exchange_code(&self, _code: &str, code_verifier: &str) -> Result<String, SsoError> {
        self.exchanged_verifiers
            .lock()
            .unwrap()
            .push(code_verifier.to_string());
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

impl FakeAvatars {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
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

pub fn identity(provider: ProviderKind, subject: &str, email: &str, name: &str) -> ExternalIdentity {
    ExternalIdentity {
        provider,
        subject: subject.into(),
        email: Some(email.into()),
        email_verified: true,
        display_name: Some(name.into()),
        avatar_url: Some("https://cdn.discordapp.com/avatars/1/a.png".into()),
    }
}

pub struct Harness {
    pub connect: Arc<ConnectService>,
    pub sso: SsoService,
    pub register: RegisterUseCase,
    pub logins: Arc<InMemoryLoginRepository>,
    pub external_logins: Arc<InMemoryExternalLoginRepository>,
    pub history: Arc<InMemoryLoginHistoryRepository>,
    pub google: Arc<FakeProvider>,
    pub discord: Arc<FakeProvider>,
    pub avatars: Arc<FakeAvatars>,
    pub jwt: Arc<JwtService>,
}

pub fn connect_config() -> ConnectConfig {
    ConnectConfig {
        issuer: "https://id.audithub.test".into(),
        login_page_url: "https://portal.test/login".into(),
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
    }
}

pub fn harness() -> Harness {
    let cache = Arc::new(MemoryCache::new(10_000));
    let logins = Arc::new(InMemoryLoginRepository::new());
    let external_logins = Arc::new(InMemoryExternalLoginRepository::new());
    let history = Arc::new(InMemoryLoginHistoryRepository::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenRepository::new());
    let hasher = Arc::new(PasswordHasher::with_params(4096, 1, 1).unwrap());
    let recorder = Arc::new(LoginHistoryRecorder::new(history.clone()));
    let jwt = Arc::new(JwtService::new(JWT_SECRET, "https://id.audithub.test", 15, 15));

    let config = connect_config();
    let connect = Arc::new(ConnectService::new(
        ConnectSettings::from(&config),
        ClientRegistry::from_config(&config.clients).unwrap(),
        ConnectComponents {
            sessions: Arc::new(CacheAuthorizationSessionStore::new(cache.clone())),
            logins: logins.clone(),
            refresh_tokens,
            jwt: jwt.clone(),
            blacklist: Arc::new(CacheTokenBlacklistService::new(cache.clone())),
            password_login: Arc::new(AuthenticatePasswordUseCase::new(
                logins.clone(),
                hasher.clone(),
                Arc::new(CacheBruteForceProtection::new(
                    cache,
                    BruteForceConfig::default(),
                )),
                recorder.clone(),
            )),
            history: recorder.clone(),
        },
    ));

    let google = Arc::new(FakeProvider::new(ProviderKind::Google));
    let discord = Arc::new(FakeProvider::new(ProviderKind::Discord));
    let avatars = Arc::new(FakeAvatars::default());

    let sso = SsoService::new(
        vec![google.clone() as Arc<dyn SsoProvider>, discord.clone()],
        connect.clone(),
        logins.clone(),
        external_logins.clone(),
        avatars.clone(),
        recorder,
    );

    Harness {
        connect,
        sso,
        register: RegisterUseCase::new(logins.clone(), hasher),
        logins,
        external_logins,
        history,
        google,
        discord,
        avatars,
        jwt,
    }
}

pub fn authorize_params(scope: &str) -> AuthorizeParams {
    AuthorizeParams {
        response_type: Some("code".into()),
        client_id: Some(CLIENT_ID.into()),
        redirect_uri: Some(REDIRECT.into()),
        scope: Some(scope.into()),
        state: Some("af0ifjsldkj".into()),
        nonce: Some("n-0S6_WzA2Mj".into()),
        code_challenge: Some(CHALLENGE.into()),
        code_challenge_method: Some("S256".into()),
    }
}

pub fn query(location: &str) -> HashMap<String, String> {
    url::Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

/// Start an authorization and return the pending request id
pub async fn pending_request(h: &Harness, scope: &str) -> String {
    let location = h.connect.authorize(authorize_params(scope)).await.unwrap();
    query(&location)["request_id"].clone()
}

pub fn code_exchange(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: Some("authorization_code".into()),
        client_id: Some(CLIENT_ID.into()),
        code: Some(code.into()),
        redirect_uri: Some(REDIRECT.into()),
        code_verifier: Some(VERIFIER.into()),
        ..TokenRequest::default()
    }
}
