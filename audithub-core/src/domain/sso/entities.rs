//! SSO provider identities and in-flight state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported upstream identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Discord,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Discord => "discord",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(ProviderKind::Google),
            "discord" => Ok(ProviderKind::Discord),
            other => Err(format!("unknown SSO provider '{}'", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity asserted by a provider after a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub provider: ProviderKind,
    pub subject: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Round-trip state for an upstream authorization, keyed by the `state` we send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoState {
    pub provider: ProviderKind,
    /// Pending local authorization request to resume after the callback
    pub request_id: String,
    /// PKCE verifier for the upstream exchange
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl SsoState {
    /// Past `max_age` the state is dead even if the store still holds it
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        (now - self.created_at).num_seconds() >= max_age.as_secs() as i64
    }
}
