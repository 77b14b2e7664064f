//! Authorization flow entities and token claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{CodeChallenge, Scope, ScopeSet};
use crate::domain::auth::value_objects::UserId;

/// A relying party allowed to use the authorization endpoint
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client_id: String,
    pub name: String,
    /// Confidential clients authenticate on /token with this secret
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub allowed_scopes: ScopeSet,
}

impl RegisteredClient {
    /// Redirect URIs are compared exactly, no prefix or wildcard matching
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    pub fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }
}

/// Validated /authorize parameters, parked until the user authenticates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub state: String,
    pub nonce: Option<String>,
    pub code_challenge: CodeChallenge,
    pub created_at: DateTime<Utc>,
}

/// Server-side record behind an issued authorization code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub user_id: UserId,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub nonce: Option<String>,
    pub code_challenge: CodeChallenge,
    /// Unix time the user authenticated
    pub auth_time: i64,
    /// Unix time after which the code is dead even if the cache still holds it
    pub expires_at: i64,
}

impl AuthorizationCode {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Lifecycle state of a stored refresh token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenStatus {
    Active,
    /// Already exchanged for a successor; presenting it again means reuse
    Rotated,
    Revoked,
    Expired,
}

/// Persisted refresh token; only the SHA-256 of the opaque value is stored
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub family_id: Uuid,
    pub user_id: UserId,
    pub client_id: String,
    pub scopes: ScopeSet,
    pub auth_time: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Revocation wins over rotation, rotation over expiry
    pub fn status_at(&self, now: DateTime<Utc>) -> RefreshTokenStatus {
        if self.revoked_at.is_some() {
            RefreshTokenStatus::Revoked
        } else if self.rotated_at.is_some() {
            RefreshTokenStatus::Rotated
        } else if now >= self.expires_at {
            RefreshTokenStatus::Expired
        } else {
            RefreshTokenStatus::Active
        }
    }
}

/// Claims of an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub jti: String,
    pub scope: String,
    pub email: String,
    pub roles: Vec<String>,
    pub typ: String,
}

impl AccessTokenClaims {
    pub const TYPE: &'static str = "access";

    pub fn user_id(&self) -> Result<UserId, String> {
        self.sub
            .parse::<UserId>()
            .map_err(|e| format!("Invalid user ID in token: {}", e))
    }

    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope).unwrap_or_default()
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scope.split_whitespace().any(|s| s == scope.as_str())
    }
}

/// Claims of an OIDC id token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub typ: String,
}

impl IdTokenClaims {
    pub const TYPE: &'static str = "id";
}

/// Result of a successful token request
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: ScopeSet,
}

/// Profile claims released by /userinfo, already filtered by scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub picture: Option<String>,
}
