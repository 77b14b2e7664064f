//! Service wiring shared by the server binary and the integration tests

use std::sync::Arc;

use audithub_core::Config;
use audithub_core::application::auth::{
    AuthenticatePasswordUseCase, GetAvatarUseCase, GetProfileUseCase, ListLoginHistoryUseCase,
    LoginHistoryRecorder, RegisterUseCase,
};
use audithub_core::application::community::{
    ActionRateLimiter, CommentService, ContentFilterService, RatingService, ReputationService,
};
use audithub_core::application::connect::{
    ClientRegistry, ConnectComponents, ConnectService, ConnectSettings,
};
use audithub_core::application::errors::ApplicationError;
use audithub_core::application::sso::{AvatarFetcher, SsoProvider, SsoService};
use audithub_core::domain::auth::repositories::{
    IExternalLoginRepository, ILoginHistoryRepository, ILoginRepository,
};
use audithub_core::domain::community::repositories::{
    ICommentRepository, IRatingRepository, IReputationRepository, IVoteRepository,
};
use audithub_core::domain::connect::repositories::IRefreshTokenRepository;
use audithub_core::infrastructure::auth::{
    BruteForceConfig, CacheBruteForceProtection, CacheTokenBlacklistService, JwtService,
    PasswordHasher,
};
use audithub_core::infrastructure::cache::CacheServiceImpl;
use audithub_core::infrastructure::connect::CacheAuthorizationSessionStore;
use audithub_core::infrastructure::memory::{
    InMemoryCommentRepository, InMemoryExternalLoginRepository, InMemoryLoginHistoryRepository,
    InMemoryLoginRepository, InMemoryRatingRepository, InMemoryRefreshTokenRepository,
    InMemoryReputationRepository, InMemoryVoteRepository,
};
use audithub_core::infrastructure::rate_limiter::RateLimiterService;

use crate::presentation::controllers::PortalState;

/// Persistence behind the portal
#[derive(Clone)]
pub struct Repositories {
    pub logins: Arc<dyn ILoginRepository>,
    pub external_logins: Arc<dyn IExternalLoginRepository>,
    pub history: Arc<dyn ILoginHistoryRepository>,
    pub refresh_tokens: Arc<dyn IRefreshTokenRepository>,
    pub comments: Arc<dyn ICommentRepository>,
    pub votes: Arc<dyn IVoteRepository>,
    pub ratings: Arc<dyn IRatingRepository>,
    pub reputation: Arc<dyn IReputationRepository>,
}

impl Repositories {
    /// Process-local repositories; nothing survives a restart
    pub fn in_memory() -> Self {
        Self {
            logins: Arc::new(InMemoryLoginRepository::new()),
            external_logins: Arc::new(InMemoryExternalLoginRepository::new()),
            history: Arc::new(InMemoryLoginHistoryRepository::new()),
            refresh_tokens: Arc::new(InMemoryRefreshTokenRepository::new()),
            comments: Arc::new(InMemoryCommentRepository::new()),
            votes: Arc::new(InMemoryVoteRepository::new()),
            ratings: Arc::new(InMemoryRatingRepository::new()),
            reputation: Arc::new(InMemoryReputationRepository::new()),
        }
    }
}

/// Infrastructure the caller builds before the services
pub struct PortalDependencies {
    pub repositories: Repositories,
    pub cache: Arc<CacheServiceImpl>,
    pub rate_limiter: Arc<RateLimiterService>,
    pub providers: Vec<Arc<dyn SsoProvider>>,
    pub avatars: Arc<dyn AvatarFetcher>,
    pub password_hasher: Arc<PasswordHasher>,
}

impl PortalState {
    /// Build every service from config and the given infrastructure
    pub fn build(config: &Config, deps: PortalDependencies) -> Result<Self, ApplicationError> {
        let PortalDependencies {
            repositories: repos,
            cache,
            rate_limiter,
            providers,
            avatars,
            password_hasher,
        } = deps;

        let recorder = Arc::new(LoginHistoryRecorder::new(repos.history.clone()));
        let jwt = Arc::new(JwtService::new(
            &config.auth.jwt_secret,
            config.connect.issuer.clone(),
            config.connect.access_token_ttl_minutes,
            config.connect.id_token_ttl_minutes,
        ));
        let brute_force = Arc::new(CacheBruteForceProtection::new(
            cache.clone(),
            BruteForceConfig::from(&config.auth.brute_force),
        ));

        let connect = Arc::new(ConnectService::new(
            ConnectSettings::from(&config.connect),
            ClientRegistry::from_config(&config.connect.clients)?,
            ConnectComponents {
                sessions: Arc::new(CacheAuthorizationSessionStore::new(cache.clone())),
                logins: repos.logins.clone(),
                refresh_tokens: repos.refresh_tokens.clone(),
                jwt,
                blacklist: Arc::new(CacheTokenBlacklistService::new(cache)),
                password_login: Arc::new(AuthenticatePasswordUseCase::new(
                    repos.logins.clone(),
                    password_hasher.clone(),
                    brute_force,
                    recorder.clone(),
                )),
                history: recorder.clone(),
            },
        ));

        let sso = Arc::new(SsoService::new(
            providers,
            connect.clone(),
            repos.logins.clone(),
            repos.external_logins.clone(),
            avatars,
            recorder,
        ));

        let filter = Arc::new(ContentFilterService::new(config.moderation.clone())?);
        let reputation = Arc::new(ReputationService::new(
            repos.reputation.clone(),
            repos.logins.clone(),
            config.reputation.clone(),
        ));
        let limiter: Arc<dyn ActionRateLimiter> = rate_limiter.clone();
        let comments = Arc::new(CommentService::new(
            repos.comments.clone(),
            repos.votes.clone(),
            filter.clone(),
            reputation.clone(),
            limiter.clone(),
        ));
        let ratings = Arc::new(RatingService::new(
            repos.ratings.clone(),
            filter,
            reputation.clone(),
            limiter,
        ));

        Ok(Self {
            connect,
            sso,
            register_use_case: Arc::new(RegisterUseCase::new(
                repos.logins.clone(),
                password_hasher,
            )),
            get_profile_use_case: Arc::new(GetProfileUseCase::new(repos.logins.clone())),
            get_avatar_use_case: Arc::new(GetAvatarUseCase::new(repos.logins.clone())),
            list_login_history_use_case: Arc::new(ListLoginHistoryUseCase::new(repos.history)),
            comments,
            ratings,
            reputation,
            rate_limiter,
        })
    }
}
