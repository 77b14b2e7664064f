//! Configuration validation module

use crate::config::{
    AuthConfig, CacheBackend, CacheConfig, ConnectConfig, DatabaseBackend, DatabaseConfig,
    ModerationConfig, ReputationConfig, ServerConfig, SsoConfig, SsoProviderConfig,
    TieredRateLimitConfig,
};
use crate::domain::connect::value_objects::{Scope, ScopeSet};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Cache configuration error: {message}")]
    Cache { message: String },

    #[error("Authentication configuration error: {message}")]
    Auth { message: String },

    #[error("Connect configuration error: {message}")]
    Connect { message: String },

    #[error("SSO configuration error: {message}")]
    Sso { message: String },

    #[error("Database configuration error: {message}")]
    Database { message: String },

    #[error("Community configuration error: {message}")]
    Community { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn sso(message: impl Into<String>) -> Self {
        Self::Sso {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn community(message: impl Into<String>) -> Self {
        Self::Community {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::server("Port must be in range 1-65535, got 0"));
        }

        if self.host.is_empty() {
            return Err(ValidationError::server("Host cannot be empty"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ValidationError::server(
                "Request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validate for TieredRateLimitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }

        for (name, tier) in [
            ("authenticated", &self.tiers.authenticated),
            ("anonymous", &self.tiers.anonymous),
        ] {
            if tier.requests_per_minute == 0 {
                return Err(ValidationError::server(format!(
                    "rate_limit.tiers.{name}.requests_per_minute must be > 0"
                )));
            }
            if tier.requests_per_hour < tier.requests_per_minute {
                return Err(ValidationError::server(format!(
                    "rate_limit.tiers.{name}.requests_per_hour must be >= requests_per_minute"
                )));
            }
        }

        for (name, action) in [
            ("comment", &self.actions.comment),
            ("vote", &self.actions.vote),
            ("rating", &self.actions.rating),
        ] {
            if action.per_minute == 0 || action.per_hour < action.per_minute {
                return Err(ValidationError::server(format!(
                    "rate_limit.actions.{name} needs per_minute > 0 and per_hour >= per_minute"
                )));
            }
        }

        let protection = &self.auth_protection;
        if protection.enabled
            && (protection.login_attempts_per_minute == 0
                || protection.register_attempts_per_minute == 0
                || protection.lockout_duration_minutes == 0)
        {
            return Err(ValidationError::server(
                "rate_limit.auth_protection limits and lockout must be > 0",
            ));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(ValidationError::server(
                "rate_limit.cleanup_interval_seconds must be > 0",
            ));
        }

        Ok(())
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == CacheBackend::Dragonfly && self.dragonfly_url.is_empty() {
            return Err(ValidationError::cache(
                "dragonfly_url is required for the dragonfly backend",
            ));
        }

        if self.backend == CacheBackend::Memory && self.memory_max_entries == 0 {
            return Err(ValidationError::cache("memory_max_entries must be > 0"));
        }

        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == DatabaseBackend::Memory {
            return Ok(());
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::database(
                "Database URL must start with postgres:// or postgresql://",
            ));
        }

        if self.max_connections == 0 {
            return Err(ValidationError::database(
                "max_connections must be greater than 0",
            ));
        }

        if let Some(min_idle) = self.min_idle
            && min_idle > self.max_connections
        {
            return Err(ValidationError::database(
                "min_idle cannot exceed max_connections",
            ));
        }

        Ok(())
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.jwt_secret.len() < 32 {
            return Err(ValidationError::auth(
                "JWT secret must be at least 32 characters long",
            ));
        }

        let bf = &self.brute_force;
        if bf.max_attempts == 0 || bf.base_lockout_seconds == 0 || bf.attempt_window_seconds == 0
        {
            return Err(ValidationError::auth(
                "brute_force attempts, lockout and window must be > 0",
            ));
        }
        if bf.max_lockout_seconds < bf.base_lockout_seconds {
            return Err(ValidationError::auth(
                "brute_force.max_lockout_seconds must be >= base_lockout_seconds",
            ));
        }
        if bf.backoff_multiplier < 1.0 {
            return Err(ValidationError::auth(
                "brute_force.backoff_multiplier must be >= 1.0",
            ));
        }

        Ok(())
    }
}

/// https, or plain http for loopback development hosts
fn is_acceptable_redirect_uri(uri: &str) -> bool {
    let Ok(parsed) = url::Url::parse(uri) else {
        return false;
    };
    if parsed.fragment().is_some() {
        return false;
    }
    match parsed.scheme() {
        "https" => true,
        "http" => matches!(
            parsed.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("[::1]")
        ),
        _ => false,
    }
}

impl Validate for ConnectConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ValidationError::connect("issuer must be an absolute URL"));
        }

        if url::Url::parse(&self.login_page_url).is_err() {
            return Err(ValidationError::connect(
                "login_page_url must be an absolute URL",
            ));
        }

        if self.authorization_request_ttl_seconds == 0
            || self.authorization_code_ttl_seconds == 0
            || self.access_token_ttl_minutes == 0
            || self.id_token_ttl_minutes == 0
            || self.refresh_token_ttl_days == 0
        {
            return Err(ValidationError::connect("token and request TTLs must be > 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for client in &self.clients {
            if client.client_id.is_empty() {
                return Err(ValidationError::connect("client_id cannot be empty"));
            }
            if !seen.insert(client.client_id.as_str()) {
                return Err(ValidationError::connect(format!(
                    "duplicate client_id '{}'",
                    client.client_id
                )));
            }
            if client.redirect_uris.is_empty() {
                return Err(ValidationError::connect(format!(
                    "client '{}' has no redirect_uris",
                    client.client_id
                )));
            }
            if let Some(bad) = client
                .redirect_uris
                .iter()
                .find(|uri| !is_acceptable_redirect_uri(uri))
            {
                return Err(ValidationError::connect(format!(
                    "client '{}' redirect_uri '{}' must be https (http only for localhost) without fragment",
                    client.client_id, bad
                )));
            }
            let scopes = ScopeSet::parse(&client.allowed_scopes.join(" "))
                .map_err(|e| ValidationError::connect(format!("client '{}': {e}", client.client_id)))?;
            if !scopes.contains(Scope::OpenId) {
                return Err(ValidationError::connect(format!(
                    "client '{}' must allow the openid scope",
                    client.client_id
                )));
            }
            if matches!(&client.client_secret, Some(secret) if secret.len() < 16) {
                return Err(ValidationError::connect(format!(
                    "client '{}' secret must be at least 16 characters",
                    client.client_id
                )));
            }
        }

        Ok(())
    }
}

fn validate_provider(name: &str, provider: &SsoProviderConfig) -> Result<(), ValidationError> {
    if !provider.enabled {
        return Ok(());
    }
    if provider.client_id.is_empty() || provider.client_secret.is_empty() {
        return Err(ValidationError::sso(format!(
            "{name} is enabled but client_id/client_secret are missing"
        )));
    }
    if url::Url::parse(&provider.redirect_uri).is_err() {
        return Err(ValidationError::sso(format!(
            "{name}.redirect_uri must be an absolute URL"
        )));
    }
    for endpoint in [
        &provider.authorize_url,
        &provider.token_url,
        &provider.userinfo_url,
    ]
    .into_iter()
    .flatten()
    {
        if !endpoint.starts_with("https://") {
            return Err(ValidationError::sso(format!(
                "{name} endpoint '{endpoint}' must use https"
            )));
        }
    }
    Ok(())
}

impl SsoConfig {
    /// Enabled providers that would fail validation, each with its problem
    pub fn misconfigured_providers(&self) -> Vec<(&'static str, ValidationError)> {
        [("google", &self.google), ("discord", &self.discord)]
            .into_iter()
            .filter_map(|(name, provider)| {
                validate_provider(name, provider).err().map(|e| (name, e))
            })
            .collect()
    }
}

impl Validate for SsoConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some((_, problem)) = self.misconfigured_providers().into_iter().next() {
            return Err(problem);
        }

        if self.avatar.max_bytes == 0 || self.avatar.timeout_seconds == 0 {
            return Err(ValidationError::sso("avatar max_bytes and timeout must be > 0"));
        }
        if self
            .avatar
            .allowed_content_types
            .iter()
            .any(|ct| !ct.starts_with("image/"))
        {
            return Err(ValidationError::sso(
                "avatar.allowed_content_types may only list image/* types",
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(ValidationError::sso("http_timeout_seconds must be > 0"));
        }

        Ok(())
    }
}

impl Validate for ModerationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_length == 0 {
            return Err(ValidationError::community("moderation.max_length must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.max_uppercase_ratio) {
            return Err(ValidationError::community(
                "moderation.max_uppercase_ratio must be within 0.0..=1.0",
            ));
        }
        if self.max_repeated_chars < 2 {
            return Err(ValidationError::community(
                "moderation.max_repeated_chars must be >= 2",
            ));
        }
        if let Some(bad) = self
            .review_patterns
            .iter()
            .find(|p| regex::Regex::new(p).is_err())
        {
            return Err(ValidationError::community(format!(
                "moderation.review_patterns contains an invalid regex: {bad}"
            )));
        }
        Ok(())
    }
}

impl Validate for ReputationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let t = &self.thresholds;
        if !(0 < t.contributor && t.contributor < t.trusted && t.trusted < t.expert) {
            return Err(ValidationError::community(
                "reputation thresholds must be positive and strictly ascending",
            ));
        }
        if self.daily_gain_cap <= 0 {
            return Err(ValidationError::community(
                "reputation.daily_gain_cap must be > 0",
            ));
        }
        let p = &self.points;
        if p.comment_published < 0
            || p.comment_upvoted < 0
            || p.rating_submitted < 0
            || p.comment_downvoted > 0
            || p.comment_removed > 0
        {
            return Err(ValidationError::community(
                "reputation rewards must be >= 0 and penalties <= 0",
            ));
        }
        Ok(())
    }
}
