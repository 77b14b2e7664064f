//! Discord sign-in (plain OAuth2, identity from `/users/@me`)

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::oauth_client::{OAuthClient, OAuthEndpoints};
use crate::application::sso::SsoProvider;
use crate::config::SsoProviderConfig;
use crate::domain::connect::value_objects::CodeChallenge;
use crate::domain::sso::{
    entities::{ExternalIdentity, ProviderKind},
    errors::SsoError,
};

const AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const USERINFO_URL: &str = "https://discord.com/api/users/@me";
const AVATAR_CDN: &str = "https://cdn.discordapp.com/avatars";

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    global_name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    verified: bool,
    avatar: Option<String>,
}

impl From<DiscordUser> for ExternalIdentity {
    fn from(user: DiscordUser) -> Self {
        let avatar_url = user
            .avatar
            .as_deref()
            .map(|hash| format!("{}/{}/{}.png", AVATAR_CDN, user.id, hash));
        ExternalIdentity {
            provider: ProviderKind::Discord,
            display_name: user.global_name.or(Some(user.username)),
            subject: user.id,
            email: user.email,
            email_verified: user.verified,
            avatar_url,
        }
    }
}

pub struct DiscordProvider {
    client: OAuthClient,
}

impl DiscordProvider {
    pub fn new(config: &SsoProviderConfig, timeout: Duration) -> Self {
        let endpoints = OAuthEndpoints::resolve(
            config,
            (AUTHORIZE_URL, TOKEN_URL, USERINFO_URL),
            "identify email",
        );
        Self {
            client: OAuthClient::new(endpoints, timeout),
        }
    }
}

#[async_trait]
impl SsoProvider for DiscordProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Discord
    }

    fn authorization_url(&self, state: &str, code_challenge: &CodeChallenge) -> String {
        self.client
            .authorization_url(state, code_challenge, &[("prompt", "none")])
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, SsoError> {
        self.client.exchange_code(code, code_verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, SsoError> {
        let user: DiscordUser = self.client.fetch_userinfo(access_token).await?;
        Ok(user.into())
    }
}
