//! Google sign-in (OpenID Connect)

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

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUserInfo> for ExternalIdentity {
    fn from(info: GoogleUserInfo) -> Self {
        ExternalIdentity {
            provider: ProviderKind::Google,
            subject: info.sub,
            email: info.email,
            email_verified: info.email_verified,
            display_name: info.name,
            avatar_url: info.picture,
        }
    }
}

pub struct GoogleProvider {
    client: OAuthClient,
}

impl GoogleProvider {
    pub fn new(config: &SsoProviderConfig, timeout: Duration) -> Self {
        let endpoints = OAuthEndpoints::resolve(
            config,
            (AUTHORIZE_URL, TOKEN_URL, USERINFO_URL),
            "openid email profile",
        );
        Self {
            client: OAuthClient::new(endpoints, timeout),
        }
    }
}

#[async_trait]
impl SsoProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorization_url(&self, state: &str, code_challenge: &CodeChallenge) -> String {
        self.client
            .authorization_url(state, code_challenge, &[("prompt", "select_account")])
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, SsoError> {
        self.client.exchange_code(code, code_verifier).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, SsoError> {
        let info: GoogleUserInfo = self.client.fetch_userinfo(access_token).await?;
        Ok(info.into())
    }
}
