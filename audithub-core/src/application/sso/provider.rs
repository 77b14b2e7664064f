use async_trait::async_trait;

use crate::domain::auth::entities::Avatar;
use crate::domain::connect::value_objects::CodeChallenge;
use crate::domain::sso::{
    entities::{ExternalIdentity, ProviderKind},
    errors::SsoError,
};

/// Upstream identity provider speaking OAuth2 authorization code with PKCE
#[async_trait]
pub trait SsoProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Where to send the user agent to sign in at the provider
    fn authorization_url(&self, state: &str, code_challenge: &CodeChallenge) -> String;

    /// Redeem the provider's code; returns the provider access token
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, SsoError>;

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, SsoError>;
}

/// Downloads a provider-hosted avatar image
#[async_trait]
pub trait AvatarFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Avatar, SsoError>;
}
