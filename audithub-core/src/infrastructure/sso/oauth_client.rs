//! Authorization code + PKCE plumbing shared by the concrete providers

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::SsoProviderConfig;
use crate::domain::connect::value_objects::CodeChallenge;
use crate::domain::sso::errors::SsoError;

const USER_AGENT: &str = concat!("AuditHub/", env!("CARGO_PKG_VERSION"));

/// Resolved endpoints and credentials for one provider
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: &'static str,
}

impl OAuthEndpoints {
    /// Configured URLs win over the provider defaults
    pub fn resolve(
        config: &SsoProviderConfig,
        defaults: (&str, &str, &str),
        scope: &'static str,
    ) -> Self {
        let pick = |custom: &Option<String>, default: &str| {
            custom
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            authorize_url: pick(&config.authorize_url, defaults.0),
            token_url: pick(&config.token_url, defaults.1),
            userinfo_url: pick(&config.userinfo_url, defaults.2),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OAuthClient {
    http: reqwest::Client,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn new(endpoints: OAuthEndpoints, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build SSO HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    pub fn authorization_url(
        &self,
        state: &str,
        challenge: &CodeChallenge,
        extra: &[(&str, &str)],
    ) -> String {
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.endpoints.client_id.as_str()),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("scope", self.endpoints.scope),
            ("state", state),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];
        params.extend_from_slice(extra);

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(params);
        let separator = if self.endpoints.authorize_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}{}",
            self.endpoints.authorize_url,
            separator,
            serializer.finish()
        )
    }

    /// Redeem `code` at the token endpoint; returns the provider access token
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, SsoError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.endpoints.redirect_uri.as_str()),
            ("client_id", self.endpoints.client_id.as_str()),
            ("client_secret", self.endpoints.client_secret.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Token endpoint unreachable");
                exchange_failed("token endpoint unreachable")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %truncate(&body, 256), "Token endpoint rejected the code");
            return Err(exchange_failed(format!("token endpoint returned {}", status)));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed token response");
            exchange_failed("malformed token response")
        })?;
        debug!("Provider code exchanged");
        Ok(token.access_token)
    }

    /// GET the userinfo endpoint with a bearer token
    pub async fn fetch_userinfo<T: DeserializeOwned>(&self, access_token: &str) -> Result<T, SsoError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Userinfo endpoint unreachable");
                exchange_failed("userinfo endpoint unreachable")
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Userinfo request failed");
            return Err(exchange_failed(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed userinfo response");
            exchange_failed("malformed userinfo response")
        })
    }
}

fn exchange_failed(message: impl Into<String>) -> SsoError {
    SsoError::ExchangeFailed {
        message: message.into(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(authorize_url: Option<&str>) -> OAuthClient {
        let config = SsoProviderConfig {
            enabled: true,
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://id.audithub.test/sso/google/callback".into(),
            authorize_url: authorize_url.map(str::to_string),
            token_url: None,
            userinfo_url: Some("  ".into()),
        };
        OAuthClient::new(
            OAuthEndpoints::resolve(
                &config,
                ("https://idp.test/auth", "https://idp.test/token", "https://idp.test/me"),
                "openid email",
            ),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn blank_overrides_fall_back_to_defaults() {
        let client = client(None);
        assert_eq!(client.endpoints().token_url, "https://idp.test/token");
        assert_eq!(client.endpoints().userinfo_url, "https://idp.test/me");
    }

    #[test]
    fn authorization_url_carries_pkce_and_state() {
        let challenge =
            CodeChallenge::new("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()).unwrap();
        let url = client(None).authorization_url("st-1", &challenge, &[("prompt", "consent")]);
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://idp.test/auth?"));
        assert_eq!(pairs["state"], "st-1");
        assert_eq!(pairs["code_challenge"], challenge.as_str());
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(
            pairs["redirect_uri"],
            "https://id.audithub.test/sso/google/callback"
        );
    }

    #[test]
    fn authorization_url_keeps_existing_query() {
        let challenge =
            CodeChallenge::new("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".to_string()).unwrap();
        let url = client(Some("https://idp.test/auth?tenant=x")).authorization_url("s", &challenge, &[]);
        assert!(url.starts_with("https://idp.test/auth?tenant=x&response_type=code"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
