//! Upstream identity providers and the avatar fetcher

pub mod avatar_fetcher;
pub mod discord;
pub mod google;
pub mod oauth_client;

pub use avatar_fetcher::{HttpAvatarFetcher, is_public_ip};
pub use discord::DiscordProvider;
pub use google::GoogleProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::application::sso::SsoProvider;
use crate::config::SsoConfig;

/// Instantiate the enabled providers only
pub fn build_providers(config: &SsoConfig) -> Vec<Arc<dyn SsoProvider>> {
    let timeout = Duration::from_secs(config.http_timeout_seconds);
    let mut providers: Vec<Arc<dyn SsoProvider>> = Vec::new();

    if config.google.enabled {
        providers.push(Arc::new(GoogleProvider::new(&config.google, timeout)));
    }
    if config.discord.enabled {
        providers.push(Arc::new(DiscordProvider::new(&config.discord, timeout)));
    }

    tracing::info!(
        providers = ?providers.iter().map(|p| p.kind().as_str()).collect::<Vec<_>>(),
        "SSO providers configured"
    );
    providers
}
