//! JWT service for access and id token issuance and validation

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::domain::auth::{entities::Login, errors::AuthError};
use crate::domain::connect::{
    entities::{AccessTokenClaims, IdTokenClaims},
    value_objects::{Scope, ScopeSet},
};

/// Clock skew tolerated when checking `exp` and `nbf`
const LEEWAY_SECONDS: u64 = 5;

/// Inputs for an id token beyond the account itself
#[derive(Debug, Clone)]
pub struct IdTokenParams<'a> {
    pub client_id: &'a str,
    pub scopes: &'a ScopeSet,
    pub auth_time: i64,
    pub nonce: Option<&'a str>,
    pub picture: Option<String>,
}

/// HS256 signer bound to one issuer
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_ttl: Duration,
    id_token_ttl: Duration,
}

impl JwtService {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        access_token_ttl_minutes: u64,
        id_token_ttl_minutes: u64,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            access_token_ttl: Duration::minutes(access_token_ttl_minutes as i64),
            id_token_ttl: Duration::minutes(id_token_ttl_minutes as i64),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Access token lifetime in seconds, as reported in `expires_in`
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    pub fn issue_access_token(
        &self,
        login: &Login,
        client_id: &str,
        scopes: &ScopeSet,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: login.user_id.to_string(),
            aud: client_id.to_string(),
            exp: (now + self.access_token_ttl).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: scopes.to_string(),
            email: login.email.as_str().to_string(),
            roles: login.roles.iter().map(|r| r.to_string()).collect(),
            typ: AccessTokenClaims::TYPE.to_string(),
        };
        self.sign(&claims)
    }

    /// Profile and email claims are released only under their scopes
    pub fn issue_id_token(&self, login: &Login, params: IdTokenParams<'_>) -> Result<String, AuthError> {
        let now = Utc::now();
        let with_email = params.scopes.contains(Scope::Email);
        let with_profile = params.scopes.contains(Scope::Profile);

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: login.user_id.to_string(),
            aud: params.client_id.to_string(),
            exp: (now + self.id_token_ttl).timestamp(),
            iat: now.timestamp(),
            auth_time: params.auth_time,
            nonce: params.nonce.map(str::to_string),
            email: with_email.then(|| login.email.as_str().to_string()),
            email_verified: with_email.then_some(login.email_verified),
            name: with_profile.then(|| login.username.as_str().to_string()),
            preferred_username: with_profile.then(|| login.username.as_str().to_string()),
            picture: if with_profile { params.picture } else { None },
            typ: IdTokenClaims::TYPE.to_string(),
        };
        self.sign(&claims)
    }

    /// Checks signature, issuer, expiry, not-before, and token type.
    ///
    /// The audience is not pinned: any registered client's access token is
    /// accepted by this resource server.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims: AccessTokenClaims = self.decode(token)?;
        if claims.typ != AccessTokenClaims::TYPE {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode JWT");
            AuthError::InvalidToken
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token validation failed");
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken,
                }
            })
    }
}
