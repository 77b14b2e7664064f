//! AuditHub server binary

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use audithub::{Config, create_app, init_tracing};
use audithub_core::config::Validate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: failed to load .env file: {e}");
    }

    let config = Config::load().map_err(|e| {
        std::io::Error::other(format!(
            "Failed to load configuration. Check DATABASE_URL and AUDITHUB__* env vars: {e}"
        ))
    })?;

    // Tracing has to be up before validation for the provider report below
    init_tracing(&config.logging)?;

    for (provider, problem) in config.sso.misconfigured_providers() {
        tracing::error!(provider, %problem, "SSO provider is enabled but misconfigured");
    }
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Refusing to start with an invalid configuration");
        std::io::Error::other(format!("Configuration validation failed: {e}"))
    })?;

    log_startup_summary(&config);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let enable_docs = config.server.enable_docs;

    let app = create_app(config)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to create application: {e}")))?;
    let shutdown = app.shutdown_token;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, docs = enable_docs, "Listening");

    tokio::spawn(cancel_on_signal(shutdown.clone()));
    let server = axum::serve(listener, app.router).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    });
    let deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server.into_future() => result?,
        () = deadline => {
            tracing::warn!(
                timeout_seconds = drain_timeout.as_secs(),
                "Connections still open after the shutdown timeout, exiting anyway"
            );
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// One line naming the backends, the issuer and the live SSO providers
fn log_startup_summary(config: &Config) {
    let sso_providers: Vec<&str> = [
        ("google", config.sso.google.enabled),
        ("discord", config.sso.discord.enabled),
    ]
    .into_iter()
    .filter_map(|(name, enabled)| enabled.then_some(name))
    .collect();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        issuer = %config.connect.issuer.trim_end_matches('/'),
        clients = config.connect.clients.len(),
        database = ?config.database.backend,
        cache = ?config.cache.backend,
        rate_limit_storage = ?config.server.rate_limit.storage_backend,
        rate_limit_enabled = config.server.rate_limit.enabled,
        sso_providers = ?sso_providers,
        "Starting AuditHub"
    );
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM; background tasks and the server both watch it
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    };
    tracing::info!(signal = signal_name, "Shutting down");
    shutdown.cancel();
}
