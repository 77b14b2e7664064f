//! Application setup and wiring

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use audithub_core::Config;
use audithub_core::config::{DatabaseBackend, DatabaseConfig};
use audithub_core::infrastructure::auth::{
    PasswordHasher, SqlxExternalLoginRepository, SqlxLoginHistoryRepository, SqlxLoginRepository,
};
use audithub_core::infrastructure::cache::CacheServiceImpl;
use audithub_core::infrastructure::community::{
    SqlxCommentRepository, SqlxRatingRepository, SqlxReputationRepository, SqlxVoteRepository,
};
use audithub_core::infrastructure::connect::SqlxRefreshTokenRepository;
use audithub_core::infrastructure::rate_limiter::RateLimiterService;
use audithub_core::infrastructure::sso::{HttpAvatarFetcher, build_providers};
use audithub_portal::{PortalDependencies, PortalState, Repositories, create_router};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
}

async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_idle.unwrap_or(0))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .max_lifetime(config.max_lifetime_seconds.map(Duration::from_secs))
        .idle_timeout(config.idle_timeout_seconds.map(Duration::from_secs))
        .test_before_acquire(config.enable_health_checks)
        .connect(&config.url)
        .await
}

fn postgres_repositories(pool: Arc<PgPool>) -> Repositories {
    Repositories {
        logins: Arc::new(SqlxLoginRepository::new(pool.clone())),
        external_logins: Arc::new(SqlxExternalLoginRepository::new(pool.clone())),
        history: Arc::new(SqlxLoginHistoryRepository::new(pool.clone())),
        refresh_tokens: Arc::new(SqlxRefreshTokenRepository::new(pool.clone())),
        comments: Arc::new(SqlxCommentRepository::new(pool.clone())),
        votes: Arc::new(SqlxVoteRepository::new(pool.clone())),
        ratings: Arc::new(SqlxRatingRepository::new(pool.clone())),
        reputation: Arc::new(SqlxReputationRepository::new(pool)),
    }
}

async fn build_repositories(
    config: &DatabaseConfig,
) -> Result<Repositories, Box<dyn std::error::Error + Send + Sync>> {
    match config.backend {
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory repositories; data is lost on restart");
            Ok(Repositories::in_memory())
        }
        DatabaseBackend::Postgres => {
            let pool = connect_database(config).await.map_err(|e| {
                tracing::error!("Failed to connect to PostgreSQL: {}", e);
                e
            })?;

            if config.run_migrations {
                tracing::info!("Applying database migrations");
                sqlx::migrate!("./migrations").run(&pool).await?;
            }

            Ok(postgres_repositories(Arc::new(pool)))
        }
    }
}

/// Create the application router and return an AppHandle for shutdown coordination
pub async fn create_app(
    config: Config,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    let startup_time = Instant::now();
    let shutdown_token = CancellationToken::new();

    let repositories = build_repositories(&config.database).await?;

    let cache = Arc::new(CacheServiceImpl::from_config(&config.cache).await.map_err(|e| {
        tracing::error!("Failed to initialize cache: {}", e);
        e
    })?);

    let rate_limiter = Arc::new(
        RateLimiterService::new_with_url(
            config.server.rate_limit.clone(),
            &config.cache.dragonfly_url,
        )
        .await,
    );
    rate_limiter.clone().start_cleanup_task(shutdown_token.clone());

    let dependencies = PortalDependencies {
        repositories,
        cache,
        rate_limiter,
        providers: build_providers(&config.sso),
        avatars: Arc::new(HttpAvatarFetcher::new(config.sso.avatar.clone())),
        password_hasher: Arc::new(PasswordHasher::new()),
    };

    let state = PortalState::build(&config, dependencies)?;
    let router = create_router(state, Arc::new(config));

    tracing::info!(
        elapsed_ms = startup_time.elapsed().as_millis() as u64,
        "Application initialized"
    );

    Ok(AppHandle {
        router,
        shutdown_token,
    })
}
