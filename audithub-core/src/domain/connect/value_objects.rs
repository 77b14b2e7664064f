//! OAuth2/OIDC value objects: scopes, PKCE challenge and verifier, grant types

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Scopes this issuer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "openid")]
    OpenId,
    #[serde(rename = "profile")]
    Profile,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "offline_access")]
    OfflineAccess,
}

impl Scope {
    pub fn all() -> [Scope; 4] {
        [Scope::OpenId, Scope::Profile, Scope::Email, Scope::OfflineAccess]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::OpenId => "openid",
            Scope::Profile => "profile",
            Scope::Email => "email",
            Scope::OfflineAccess => "offline_access",
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openid" => Ok(Scope::OpenId),
            "profile" => Ok(Scope::Profile),
            "email" => Ok(Scope::Email),
            "offline_access" => Ok(Scope::OfflineAccess),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated set of scopes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    /// Parse a space-delimited scope parameter
    pub fn parse(raw: &str) -> Result<Self, String> {
        raw.split_whitespace()
            .map(Scope::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&joined)
    }
}

/// PKCE transform. Only S256 is accepted; `plain` defeats the purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    S256,
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Err("code_challenge_method 'plain' is not allowed".to_string()),
            other => Err(format!("unsupported code_challenge_method '{}'", other)),
        }
    }
}

/// BASE64URL(SHA256(verifier)) as sent by the client on /authorize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeChallenge(String);

impl CodeChallenge {
    /// Length of an unpadded base64url SHA-256 digest
    pub const LENGTH: usize = 43;

    pub fn new(challenge: String) -> Result<Self, String> {
        if challenge.len() != Self::LENGTH {
            return Err(format!(
                "code_challenge must be {} characters",
                Self::LENGTH
            ));
        }
        if !challenge
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err("code_challenge must be base64url without padding".to_string());
        }
        Ok(Self(challenge))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// High-entropy secret the client reveals on /token
#[derive(Clone)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    pub const MIN_LENGTH: usize = 43;
    pub const MAX_LENGTH: usize = 128;

    pub fn new(verifier: String) -> Result<Self, String> {
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&verifier.len()) {
            return Err(format!(
                "code_verifier must be {}-{} characters",
                Self::MIN_LENGTH,
                Self::MAX_LENGTH
            ));
        }
        if !verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
        {
            return Err("code_verifier contains characters outside [A-Za-z0-9-._~]".to_string());
        }
        Ok(Self(verifier))
    }

    /// S256 transform of this verifier
    pub fn challenge(&self) -> CodeChallenge {
        let digest = Sha256::digest(self.0.as_bytes());
        CodeChallenge(URL_SAFE_NO_PAD.encode(digest))
    }

    /// Constant-time comparison against a stored challenge
    pub fn matches(&self, challenge: &CodeChallenge) -> bool {
        let computed = self.challenge();
        computed
            .0
            .as_bytes()
            .ct_eq(challenge.0.as_bytes())
            .into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CodeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeVerifier(***)")
    }
}

/// Token endpoint grant types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(format!("grant_type '{}' is not supported", other)),
        }
    }
}
