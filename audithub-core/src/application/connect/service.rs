//! Authorization server: /authorize, code issuance, /token, /revoke, /userinfo

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::clients::ClientRegistry;
use super::discovery::DiscoveryDocument;
use super::random_token;
use super::session::AuthorizationSessionStore;
use crate::application::auth::{AuthenticatePasswordUseCase, LoginAttempt, LoginHistoryRecorder};
use crate::application::errors::ApplicationError;
use crate::config::ConnectConfig;
use crate::domain::auth::{
    entities::{Login, LoginContext},
    errors::AuthError,
    repositories::ILoginRepository,
    value_objects::{LoginMethod, UserId},
};
use crate::domain::connect::{
    entities::{
        AccessTokenClaims, AuthorizationCode, AuthorizationRequest, IssuedTokens, RefreshToken,
        RefreshTokenStatus, RegisteredClient, UserInfo,
    },
    errors::{AuthorizeError, ConnectError, append_query},
    repositories::IRefreshTokenRepository,
    value_objects::{CodeChallenge, CodeChallengeMethod, CodeVerifier, GrantType, Scope, ScopeSet},
};
use crate::infrastructure::auth::{IdTokenParams, JwtService, TokenBlacklistService};

/// Issuer settings derived from [`ConnectConfig`]
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub issuer: String,
    pub login_page_url: String,
    pub request_ttl: Duration,
    pub code_ttl: Duration,
    pub refresh_token_ttl: chrono::Duration,
}

impl From<&ConnectConfig> for ConnectSettings {
    fn from(config: &ConnectConfig) -> Self {
        Self {
            issuer: config.issuer.trim_end_matches('/').to_string(),
            login_page_url: config.login_page_url.clone(),
            request_ttl: Duration::from_secs(config.authorization_request_ttl_seconds),
            code_ttl: Duration::from_secs(config.authorization_code_ttl_seconds),
            refresh_token_ttl: chrono::Duration::days(config.refresh_token_ttl_days as i64),
        }
    }
}

/// Raw /authorize query parameters
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Raw /token form parameters; which ones are required depends on the grant
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RevokeRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// What the login page shows for a pending request
#[derive(Debug, Clone)]
pub struct RequestDescription {
    pub client_name: String,
    pub scopes: ScopeSet,
}

/// Collaborators of [`ConnectService`]
pub struct ConnectComponents {
    pub sessions: Arc<dyn AuthorizationSessionStore>,
    pub logins: Arc<dyn ILoginRepository>,
    pub refresh_tokens: Arc<dyn IRefreshTokenRepository>,
    pub jwt: Arc<JwtService>,
    pub blacklist: Arc<dyn TokenBlacklistService>,
    pub password_login: Arc<AuthenticatePasswordUseCase>,
    pub history: Arc<LoginHistoryRecorder>,
}

pub struct ConnectService {
    settings: ConnectSettings,
    clients: ClientRegistry,
    sessions: Arc<dyn AuthorizationSessionStore>,
    logins: Arc<dyn ILoginRepository>,
    refresh_tokens: Arc<dyn IRefreshTokenRepository>,
    jwt: Arc<JwtService>,
    blacklist: Arc<dyn TokenBlacklistService>,
    password_login: Arc<AuthenticatePasswordUseCase>,
    history: Arc<LoginHistoryRecorder>,
}

/// Logs an infrastructure failure and hides it behind `server_error`
fn server_error(error: impl std::fmt::Display) -> ConnectError {
    tracing::error!(error = %error, "Authorization server failure");
    ConnectError::ServerError("the authorization server encountered an error".into())
}

fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

impl ConnectService {
    pub fn new(settings: ConnectSettings, clients: ClientRegistry, components: ConnectComponents) -> Self {
        Self {
            settings,
            clients,
            sessions: components.sessions,
            logins: components.logins,
            refresh_tokens: components.refresh_tokens,
            jwt: components.jwt,
            blacklist: components.blacklist,
            password_login: components.password_login,
            history: components.history,
        }
    }

    pub fn settings(&self) -> &ConnectSettings {
        &self.settings
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn sessions(&self) -> &Arc<dyn AuthorizationSessionStore> {
        &self.sessions
    }

    /// Public URL of a stored avatar, if the account has one
    pub fn picture_url(&self, login: &Login) -> Option<String> {
        login
            .has_avatar()
            .then(|| format!("{}/api/v1/users/{}/avatar", self.settings.issuer, login.user_id))
    }

    /// Validate an /authorize call and park it for the login page.
    ///
    /// Returns the login page location. Errors before the client and redirect
    /// URI are trusted are never redirected.
    #[tracing::instrument(skip_all, fields(client_id = ?params.client_id))]
    pub async fn authorize(&self, params: AuthorizeParams) -> Result<String, AuthorizeError> {
        let client_id = params.client_id.as_deref().ok_or_else(|| {
            AuthorizeError::direct(ConnectError::InvalidRequest("client_id is required".into()))
        })?;
        let client = self
            .clients
            .get(client_id)
            .ok_or_else(|| AuthorizeError::direct(ConnectError::InvalidClient("unknown client".into())))?;
        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .filter(|uri| client.allows_redirect(uri))
            .ok_or_else(|| {
                AuthorizeError::direct(ConnectError::InvalidRequest(
                    "redirect_uri is missing or not registered for this client".into(),
                ))
            })?;

        let state = params.state.as_deref().filter(|s| !s.is_empty());
        let redirect = |error: ConnectError| AuthorizeError::redirected(error, redirect_uri, state);

        if params.response_type.as_deref() != Some("code") {
            return Err(redirect(ConnectError::UnsupportedResponseType(
                "only response_type=code is supported".into(),
            )));
        }
        let state = state.ok_or_else(|| redirect(ConnectError::InvalidRequest("state is required".into())))?;

        let scopes = self
            .requested_scopes(client, params.scope.as_deref())
            .map_err(redirect)?;

        let raw_challenge = params
            .code_challenge
            .ok_or_else(|| redirect(ConnectError::InvalidRequest("code_challenge is required".into())))?;
        params
            .code_challenge_method
            .as_deref()
            .unwrap_or("plain")
            .parse::<CodeChallengeMethod>()
            .map_err(|e| redirect(ConnectError::InvalidRequest(e)))?;
        let code_challenge =
            CodeChallenge::new(raw_challenge).map_err(|e| redirect(ConnectError::InvalidRequest(e)))?;

        let request = AuthorizationRequest {
            id: random_token(),
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.to_string(),
            scopes,
            state: state.to_string(),
            nonce: params.nonce.filter(|n| !n.is_empty()),
            code_challenge,
            created_at: Utc::now(),
        };
        self.sessions
            .save_request(&request, self.settings.request_ttl)
            .await
            .map_err(|e| redirect(server_error(e)))?;

        tracing::info!(client_id = %request.client_id, "Authorization request accepted");
        Ok(append_query(
            &self.settings.login_page_url,
            &[("request_id", request.id.as_str())],
        ))
    }

    fn requested_scopes(
        &self,
        client: &RegisteredClient,
        raw: Option<&str>,
    ) -> Result<ScopeSet, ConnectError> {
        let scopes = ScopeSet::parse(raw.unwrap_or_default()).map_err(ConnectError::InvalidScope)?;
        if !scopes.contains(Scope::OpenId) {
            return Err(ConnectError::InvalidScope("scope 'openid' is required".into()));
        }
        if !scopes.is_subset(&client.allowed_scopes) {
            return Err(ConnectError::InvalidScope(
                "requested scope is not allowed for this client".into(),
            ));
        }
        Ok(scopes)
    }

    pub async fn describe_request(
        &self,
        request_id: &str,
    ) -> Result<RequestDescription, ApplicationError> {
        let request = self
            .sessions
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "authorization request".into(),
                id: request_id.to_string(),
            })?;
        let client_name = self
            .clients
            .get(&request.client_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| request.client_id.clone());
        Ok(RequestDescription {
            client_name,
            scopes: request.scopes,
        })
    }

    /// Password step of a pending request. A failed login leaves the request
    /// in place so the user can retry.
    #[tracing::instrument(skip_all)]
    pub async fn password_login(
        &self,
        request_id: &str,
        email: &str,
        password: String,
        context: LoginContext,
    ) -> Result<String, ApplicationError> {
        let request = self
            .sessions
            .find_request(request_id)
            .await?
            .ok_or_else(|| {
                ConnectError::InvalidRequest("authorization request is unknown or expired".into())
            })?;

        let context = context.with_client(request.client_id);
        let login = self.password_login.execute(email, password, &context).await?;
        self.complete_authorization(request_id, &login, Utc::now().timestamp())
            .await
    }

    /// Consume a pending request and issue its authorization code.
    ///
    /// Returns the client redirect carrying `code` and `state`.
    #[tracing::instrument(skip_all, fields(user_id = %login.user_id))]
    pub async fn complete_authorization(
        &self,
        request_id: &str,
        login: &Login,
        auth_time: i64,
    ) -> Result<String, ApplicationError> {
        let request = self
            .sessions
            .take_request(request_id)
            .await?
            .ok_or_else(|| {
                ConnectError::InvalidRequest("authorization request is unknown or expired".into())
            })?;

        let code = random_token();
        let grant = AuthorizationCode {
            user_id: login.user_id,
            client_id: request.client_id,
            redirect_uri: request.redirect_uri.clone(),
            scopes: request.scopes,
            nonce: request.nonce,
            code_challenge: request.code_challenge,
            auth_time,
            expires_at: Utc::now().timestamp() + self.settings.code_ttl.as_secs() as i64,
        };
        self.sessions
            .save_code(&code, &grant, self.settings.code_ttl)
            .await?;

        tracing::info!(client_id = %grant.client_id, "Authorization code issued");
        Ok(append_query(
            &request.redirect_uri,
            &[("code", code.as_str()), ("state", request.state.as_str())],
        ))
    }

    #[tracing::instrument(skip_all, fields(grant_type = ?request.grant_type, client_id = ?request.client_id))]
    pub async fn exchange_token(&self, request: TokenRequest) -> Result<IssuedTokens, ConnectError> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| ConnectError::InvalidRequest("grant_type is required".into()))?
            .parse::<GrantType>()
            .map_err(ConnectError::UnsupportedGrantType)?;

        let client = self
            .clients
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())?;

        match grant_type {
            GrantType::AuthorizationCode => self.authorization_code_grant(client, request).await,
            GrantType::RefreshToken => self.refresh_token_grant(client, request).await,
        }
    }

    async fn authorization_code_grant(
        &self,
        client: &RegisteredClient,
        request: TokenRequest,
    ) -> Result<IssuedTokens, ConnectError> {
        let code = request
            .code
            .ok_or_else(|| ConnectError::InvalidRequest("code is required".into()))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| ConnectError::InvalidRequest("redirect_uri is required".into()))?;
        let raw_verifier = request
            .code_verifier
            .ok_or_else(|| ConnectError::InvalidRequest("code_verifier is required".into()))?;

        // Taken before any check so a failed exchange still burns the code
        let grant = self
            .sessions
            .take_code(&code)
            .await
            .map_err(server_error)?
            .ok_or_else(|| {
                ConnectError::InvalidGrant("authorization code is invalid, expired, or already used".into())
            })?;

        if grant.is_expired_at(Utc::now().timestamp()) {
            return Err(ConnectError::InvalidGrant("authorization code has expired".into()));
        }
        if grant.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Authorization code presented by another client");
            return Err(ConnectError::InvalidGrant(
                "authorization code was issued to another client".into(),
            ));
        }
        if grant.redirect_uri != redirect_uri {
            return Err(ConnectError::InvalidGrant("redirect_uri does not match".into()));
        }

        let verifier = CodeVerifier::new(raw_verifier).map_err(ConnectError::InvalidRequest)?;
        if !verifier.matches(&grant.code_challenge) {
            tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
            return Err(ConnectError::InvalidGrant("code_verifier does not match".into()));
        }

        let login = self.load_login(&grant.user_id).await?;

        let refresh_token = if grant.scopes.contains(Scope::OfflineAccess) {
            Some(
                self.store_refresh_token(&login, client, &grant.scopes, grant.auth_time, Uuid::new_v4())
                    .await?
                    .0,
            )
        } else {
            None
        };

        let tokens = self.issue_tokens(
            &login,
            client,
            grant.scopes,
            grant.auth_time,
            grant.nonce.as_deref(),
            refresh_token,
        )?;
        tracing::info!(user_id = %login.user_id, client_id = %client.client_id, "Tokens issued for authorization code");
        Ok(tokens)
    }

    async fn refresh_token_grant(
        &self,
        client: &RegisteredClient,
        request: TokenRequest,
    ) -> Result<IssuedTokens, ConnectError> {
        let presented = request
            .refresh_token
            .ok_or_else(|| ConnectError::InvalidRequest("refresh_token is required".into()))?;
        let invalid = || ConnectError::InvalidGrant("refresh token is invalid".into());

        let token = self
            .refresh_tokens
            .find_by_hash(&sha256_hex(&presented))
            .await
            .map_err(server_error)?
            .ok_or_else(invalid)?;

        if token.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Refresh token presented by another client");
            return Err(invalid());
        }

        let now = Utc::now();
        match token.status_at(now) {
            RefreshTokenStatus::Active => {}
            RefreshTokenStatus::Rotated => return Err(self.handle_reuse(&token).await),
            RefreshTokenStatus::Revoked => return Err(invalid()),
            RefreshTokenStatus::Expired => {
                return Err(ConnectError::InvalidGrant("refresh token has expired".into()));
            }
        }

        let scopes = match request.scope.as_deref() {
            Some(raw) => {
                let requested = ScopeSet::parse(raw).map_err(ConnectError::InvalidScope)?;
                if !requested.is_subset(&token.scopes) {
                    return Err(ConnectError::InvalidScope(
                        "requested scope exceeds the original grant".into(),
                    ));
                }
                requested
            }
            None => token.scopes.clone(),
        };

        let login = self.load_login(&token.user_id).await?;

        let (new_value, successor) = self.new_refresh_token(
            &login,
            client,
            &token.scopes,
            token.auth_time,
            token.family_id,
        );
        // Successor first, so a rotated token always points at a stored row
        self.refresh_tokens
            .create(&successor)
            .await
            .map_err(server_error)?;
        let rotated = self
            .refresh_tokens
            .mark_rotated(token.id, successor.id, now)
            .await
            .map_err(server_error)?;
        if !rotated {
            // A concurrent refresh won the race; revoking the family also
            // takes out the successor stored above
            return Err(self.handle_reuse(&token).await);
        }

        self.history
            .record(
                LoginAttempt {
                    user_id: Some(login.user_id),
                    identifier: login.email.as_str(),
                    method: LoginMethod::RefreshToken,
                    success: true,
                    failure_reason: None,
                },
                &LoginContext::default().with_client(client.client_id.clone()),
            )
            .await;

        let tokens = self.issue_tokens(&login, client, scopes, token.auth_time, None, Some(new_value))?;
        tracing::info!(user_id = %login.user_id, client_id = %client.client_id, "Refresh token rotated");
        Ok(tokens)
    }

    /// A rotated token came back: assume theft and shut the whole family down
    async fn handle_reuse(&self, token: &RefreshToken) -> ConnectError {
        tracing::warn!(
            user_id = %token.user_id,
            family_id = %token.family_id,
            "Refresh token reuse detected, revoking family"
        );
        let now = Utc::now();
        if let Err(e) = self.refresh_tokens.revoke_family(token.family_id, now).await {
            return server_error(e);
        }
        let ttl = Duration::from_secs(self.jwt.access_token_ttl_seconds().max(1) as u64);
        if let Err(e) = self.blacklist.revoke_all_user_tokens(&token.user_id, ttl).await {
            return server_error(e);
        }

        self.history
            .record(
                LoginAttempt {
                    user_id: Some(token.user_id),
                    identifier: &token.user_id.to_string(),
                    method: LoginMethod::RefreshToken,
                    success: false,
                    failure_reason: Some("refresh_token_reuse"),
                },
                &LoginContext::default().with_client(token.client_id.clone()),
            )
            .await;

        ConnectError::InvalidGrant("refresh token is invalid".into())
    }

    async fn load_login(&self, user_id: &UserId) -> Result<Login, ConnectError> {
        self.logins
            .find_by_id(user_id)
            .await
            .map_err(server_error)?
            .ok_or_else(|| ConnectError::InvalidGrant("the account no longer exists".into()))
    }

    fn new_refresh_token(
        &self,
        login: &Login,
        client: &RegisteredClient,
        scopes: &ScopeSet,
        auth_time: i64,
        family_id: Uuid,
    ) -> (String, RefreshToken) {
        let value = random_token();
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: sha256_hex(&value),
            family_id,
            user_id: login.user_id,
            client_id: client.client_id.clone(),
            scopes: scopes.clone(),
            auth_time,
            issued_at: now,
            expires_at: now + self.settings.refresh_token_ttl,
            rotated_at: None,
            replaced_by: None,
            revoked_at: None,
        };
        (value, token)
    }

    async fn store_refresh_token(
        &self,
        login: &Login,
        client: &RegisteredClient,
        scopes: &ScopeSet,
        auth_time: i64,
        family_id: Uuid,
    ) -> Result<(String, RefreshToken), ConnectError> {
        let (value, token) = self.new_refresh_token(login, client, scopes, auth_time, family_id);
        self.refresh_tokens
            .create(&token)
            .await
            .map_err(server_error)?;
        Ok((value, token))
    }

    fn issue_tokens(
        &self,
        login: &Login,
        client: &RegisteredClient,
        scopes: ScopeSet,
        auth_time: i64,
        nonce: Option<&str>,
        refresh_token: Option<String>,
    ) -> Result<IssuedTokens, ConnectError> {
        let access_token = self
            .jwt
            .issue_access_token(login, &client.client_id, &scopes)
            .map_err(server_error)?;

        let id_token = if scopes.contains(Scope::OpenId) {
            Some(
                self.jwt
                    .issue_id_token(
                        login,
                        IdTokenParams {
                            client_id: &client.client_id,
                            scopes: &scopes,
                            auth_time,
                            nonce,
                            picture: self.picture_url(login),
                        },
                    )
                    .map_err(server_error)?,
            )
        } else {
            None
        };

        Ok(IssuedTokens {
            access_token,
            token_type: "Bearer",
            expires_in: self.jwt.access_token_ttl_seconds(),
            id_token,
            refresh_token,
            scope: scopes,
        })
    }

    /// Token revocation (RFC 7009). Unknown tokens are not an error.
    #[tracing::instrument(skip_all, fields(client_id = ?request.client_id))]
    pub async fn revoke(&self, request: RevokeRequest) -> Result<(), ConnectError> {
        let client = self
            .clients
            .authenticate(request.client_id.as_deref(), request.client_secret.as_deref())?;
        let Some(token) = request.token.filter(|t| !t.is_empty()) else {
            return Err(ConnectError::InvalidRequest("token is required".into()));
        };

        if request.token_type_hint.as_deref() != Some("access_token")
            && let Some(stored) = self
                .refresh_tokens
                .find_by_hash(&sha256_hex(&token))
                .await
                .map_err(server_error)?
        {
            if stored.client_id == client.client_id {
                let revoked = self
                    .refresh_tokens
                    .revoke_family(stored.family_id, Utc::now())
                    .await
                    .map_err(server_error)?;
                tracing::info!(client_id = %client.client_id, revoked, "Refresh token family revoked");
            }
            return Ok(());
        }

        if let Ok(claims) = self.jwt.validate_access_token(&token)
            && claims.aud == client.client_id
        {
            let remaining = (claims.exp - Utc::now().timestamp()).max(1) as u64;
            self.blacklist
                .blacklist_token(&claims.jti, Duration::from_secs(remaining))
                .await
                .map_err(server_error)?;
            tracing::info!(client_id = %client.client_id, "Access token revoked");
        }
        Ok(())
    }

    /// Bearer validation: signature, issuer, expiry, type, then revocation
    pub async fn validate_access_token(
        &self,
        token: &str,
    ) -> Result<AccessTokenClaims, ApplicationError> {
        let claims = self.jwt.validate_access_token(token)?;
        if self.blacklist.is_blacklisted(&claims.jti).await? {
            return Err(AuthError::TokenRevoked.into());
        }
        let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;
        if self
            .blacklist
            .are_user_tokens_revoked(&user_id, claims.iat)
            .await?
        {
            return Err(AuthError::TokenRevoked.into());
        }
        Ok(claims)
    }

    /// Profile claims released under the token's scopes
    pub async fn userinfo(&self, claims: &AccessTokenClaims) -> Result<UserInfo, ApplicationError> {
        let user_id = claims.user_id().map_err(|_| AuthError::InvalidToken)?;
        let login = self
            .logins
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let mut info = UserInfo {
            sub: login.user_id.to_string(),
            ..UserInfo::default()
        };
        if claims.has_scope(Scope::Email) {
            info.email = Some(login.email.as_str().to_string());
            info.email_verified = Some(login.email_verified);
        }
        if claims.has_scope(Scope::Profile) {
            info.name = Some(login.username.as_str().to_string());
            info.preferred_username = Some(login.username.as_str().to_string());
            info.picture = self.picture_url(&login);
        }
        Ok(info)
    }

    pub fn discovery(&self) -> DiscoveryDocument {
        DiscoveryDocument::for_issuer(&self.settings.issuer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::infrastructure::auth::{
        BruteForceConfig, CacheBruteForceProtection, CacheTokenBlacklistService, PasswordHasher,
    };
    use crate::infrastructure::cache::MemoryCache;
    use crate::infrastructure::connect::CacheAuthorizationSessionStore;
    use crate::infrastructure::memory::{
        InMemoryLoginHistoryRepository, InMemoryLoginRepository, InMemoryRefreshTokenRepository,
    };
    use crate::domain::auth::value_objects::{Email, Password, Username};

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
    const REDIRECT: &str = "https://portal.test/cb";

    struct Fixture {
        service: ConnectService,
        sessions: Arc<CacheAuthorizationSessionStore<MemoryCache>>,
        refresh_tokens: Arc<InMemoryRefreshTokenRepository>,
        history: Arc<InMemoryLoginHistoryRepository>,
        login: Login,
    }

    /// Stores tokens normally but always loses the rotation race, as if a
    /// concurrent refresh had rotated the same token first
    struct LosesRotation(Arc<InMemoryRefreshTokenRepository>);

    #[async_trait::async_trait]
    impl IRefreshTokenRepository for LosesRotation {
        async fn create(&self, token: &RefreshToken) -> Result<(), AuthError> {
            self.0.create(token).await
        }

        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AuthError> {
            self.0.find_by_hash(token_hash).await
        }

        async fn mark_rotated(
            &self,
            _id: Uuid,
            _replaced_by: Uuid,
            _at: chrono::DateTime<Utc>,
        ) -> Result<bool, AuthError> {
            Ok(false)
        }

        async fn revoke_family(
            &self,
            family_id: Uuid,
            at: chrono::DateTime<Utc>,
        ) -> Result<u64, AuthError> {
            self.0.revoke_family(family_id, at).await
        }
    }

    fn client(client_id: &str, name: &str) -> ClientConfig {
        ClientConfig {
            client_id: client_id.into(),
            name: name.into(),
            client_secret: None,
            redirect_uris: vec![REDIRECT.into()],
            allowed_scopes: vec![
                "openid".into(),
                "email".into(),
                "profile".into(),
                "offline_access".into(),
            ],
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(|store| store).await
    }

    async fn fixture_with(
        refresh_store: impl FnOnce(Arc<InMemoryRefreshTokenRepository>) -> Arc<dyn IRefreshTokenRepository>,
    ) -> Fixture {
        let cache = Arc::new(MemoryCache::new(1_000));
        let logins = Arc::new(InMemoryLoginRepository::new());
        let history = Arc::new(InMemoryLoginHistoryRepository::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenRepository::new());
        let sessions = Arc::new(CacheAuthorizationSessionStore::new(cache.clone()));
        let hasher = Arc::new(PasswordHasher::with_params(4096, 1, 1).unwrap());
        let recorder = Arc::new(LoginHistoryRecorder::new(history.clone()));

        let login = Login::new_with_password(
            Email::new("auditor@example.com".into()).unwrap(),
            Username::new("auditor".into()).unwrap(),
            hasher
                .hash(&Password::new("password1".into()).unwrap())
                .await
                .unwrap(),
        );
        logins.create(&login).await.unwrap();

        let config = ConnectConfig {
            issuer: "https://id.audithub.test/".into(),
            login_page_url: "https://portal.test/login".into(),
            clients: vec![client("portal", "Portal"), client("partner", "Partner")],
            ..ConnectConfig::default()
        };

        let service = ConnectService::new(
            ConnectSettings::from(&config),
            ClientRegistry::from_config(&config.clients).unwrap(),
            ConnectComponents {
                sessions: sessions.clone(),
                logins: logins.clone(),
                refresh_tokens: refresh_store(refresh_tokens.clone()),
                jwt: Arc::new(JwtService::new(
                    "test-secret-key-at-least-32-characters-long",
                    "https://id.audithub.test",
                    15,
                    15,
                )),
                blacklist: Arc::new(CacheTokenBlacklistService::new(cache.clone())),
                password_login: Arc::new(AuthenticatePasswordUseCase::new(
                    logins,
                    hasher,
                    Arc::new(CacheBruteForceProtection::new(cache, BruteForceConfig::default())),
                    recorder.clone(),
                )),
                history: recorder,
            },
        );

        Fixture {
            service,
            sessions,
            refresh_tokens,
            history,
            login,
        }
    }

    fn params(scope: &str) -> AuthorizeParams {
        AuthorizeParams {
            response_type: Some("code".into()),
            client_id: Some("portal".into()),
            redirect_uri: Some(REDIRECT.into()),
            scope: Some(scope.into()),
            state: Some("xyz".into()),
            nonce: Some("n-0S6".into()),
            code_challenge: Some(CHALLENGE.into()),
            code_challenge_method: Some("S256".into()),
        }
    }

    fn query_param(location: &str, name: &str) -> Option<String> {
        let url = url::Url::parse(location).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    async fn obtain_code(f: &Fixture, scope: &str) -> String {
        let location = f.service.authorize(params(scope)).await.unwrap();
        let request_id = query_param(&location, "request_id").unwrap();
        let redirect = f
            .service
            .password_login(&request_id, "auditor@example.com", "password1".into(), LoginContext::default())
            .await
            .unwrap();
        assert!(redirect.starts_with(REDIRECT));
        assert_eq!(query_param(&redirect, "state").as_deref(), Some("xyz"));
        query_param(&redirect, "code").unwrap()
    }

    fn code_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".into()),
            client_id: Some("portal".into()),
            code: Some(code.into()),
            redirect_uri: Some(REDIRECT.into()),
            code_verifier: Some(VERIFIER.into()),
            ..TokenRequest::default()
        }
    }

    fn refresh_request(token: &str) -> TokenRequest {
        TokenRequest {
            grant_type: Some("refresh_token".into()),
            client_id: Some("portal".into()),
            refresh_token: Some(token.into()),
            ..TokenRequest::default()
        }
    }

    #[tokio::test]
    async fn test_untrusted_errors_are_not_redirected() {
        let f = fixture().await;

        let unknown_client = f
            .service
            .authorize(AuthorizeParams {
                client_id: Some("evil".into()),
                ..params("openid")
            })
            .await
            .unwrap_err();
        assert_eq!(unknown_client.error.code(), "invalid_client");
        assert!(unknown_client.redirect_location().is_none());

        let bad_redirect = f
            .service
            .authorize(AuthorizeParams {
                redirect_uri: Some("https://evil.test/cb".into()),
                ..params("openid")
            })
            .await
            .unwrap_err();
        assert_eq!(bad_redirect.error.code(), "invalid_request");
        assert!(bad_redirect.redirect_location().is_none());
    }

    #[tokio::test]
    async fn test_redirected_authorize_errors() {
        let f = fixture().await;
        let cases = [
            (
                AuthorizeParams {
                    response_type: Some("token".into()),
                    ..params("openid")
                },
                "unsupported_response_type",
            ),
            (params("profile"), "invalid_scope"),
            (
                AuthorizeParams {
                    code_challenge_method: Some("plain".into()),
                    ..params("openid")
                },
                "invalid_request",
            ),
            (
                AuthorizeParams {
                    code_challenge: None,
                    ..params("openid")
                },
                "invalid_request",
            ),
            (
                AuthorizeParams {
                    code_challenge: Some("short".into()),
                    ..params("openid")
                },
                "invalid_request",
            ),
        ];
        for (input, code) in cases {
            let err = f.service.authorize(input).await.unwrap_err();
            assert_eq!(err.error.code(), code);
            let location = err.redirect_location().unwrap();
            assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
        }

        let missing_state = f
            .service
            .authorize(AuthorizeParams {
                state: None,
                ..params("openid")
            })
            .await
            .unwrap_err();
        assert_eq!(missing_state.error.code(), "invalid_request");
        assert!(query_param(&missing_state.redirect_location().unwrap(), "state").is_none());
    }

    #[tokio::test]
    async fn test_code_flow_issues_tokens_once() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid email").await;

        let tokens = f.service.exchange_token(code_request(&code)).await.unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        assert!(tokens.id_token.is_some());
        assert!(tokens.refresh_token.is_none());

        let claims = f.service.validate_access_token(&tokens.access_token).await.unwrap();
        assert_eq!(claims.sub, f.login.user_id.to_string());
        assert_eq!(claims.aud, "portal");

        let info = f.service.userinfo(&claims).await.unwrap();
        assert_eq!(info.email.as_deref(), Some("auditor@example.com"));
        assert!(info.preferred_username.is_none());

        let replay = f.service.exchange_token(code_request(&code)).await.unwrap_err();
        assert_eq!(replay.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_wrong_verifier_burns_the_code() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid").await;

        let wrong = TokenRequest {
            code_verifier: Some("a".repeat(43)),
            ..code_request(&code)
        };
        assert_eq!(
            f.service.exchange_token(wrong).await.unwrap_err().code(),
            "invalid_grant"
        );
        assert_eq!(
            f.service.exchange_token(code_request(&code)).await.unwrap_err().code(),
            "invalid_grant"
        );
    }

    #[tokio::test]
    async fn test_malformed_verifier_and_redirect_mismatch() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid").await;
        let malformed = TokenRequest {
            code_verifier: Some("too-short".into()),
            ..code_request(&code)
        };
        assert_eq!(
            f.service.exchange_token(malformed).await.unwrap_err().code(),
            "invalid_request"
        );

        let code = obtain_code(&f, "openid").await;
        let mismatch = TokenRequest {
            redirect_uri: Some("https://portal.test/other".into()),
            ..code_request(&code)
        };
        assert_eq!(
            f.service.exchange_token(mismatch).await.unwrap_err().code(),
            "invalid_grant"
        );
    }

    #[tokio::test]
    async fn test_grant_type_and_client_checks() {
        let f = fixture().await;
        let unsupported = TokenRequest {
            grant_type: Some("password".into()),
            ..TokenRequest::default()
        };
        assert_eq!(
            f.service.exchange_token(unsupported).await.unwrap_err().code(),
            "unsupported_grant_type"
        );

        let unknown_client = TokenRequest {
            client_id: Some("nobody".into()),
            ..code_request("whatever")
        };
        assert_eq!(
            f.service.exchange_token(unknown_client).await.unwrap_err().code(),
            "invalid_client"
        );
    }

    #[tokio::test]
    async fn test_failed_login_keeps_request() {
        let f = fixture().await;
        let location = f.service.authorize(params("openid")).await.unwrap();
        let request_id = query_param(&location, "request_id").unwrap();

        let failed = f
            .service
            .password_login(&request_id, "auditor@example.com", "wrong-pass1".into(), LoginContext::default())
            .await;
        assert!(matches!(
            failed,
            Err(ApplicationError::Authentication(AuthError::InvalidCredentials))
        ));

        let described = f.service.describe_request(&request_id).await.unwrap();
        assert_eq!(described.client_name, "Portal");

        f.service
            .password_login(&request_id, "auditor@example.com", "password1".into(), LoginContext::default())
            .await
            .unwrap();
        assert!(matches!(
            f.service.describe_request(&request_id).await,
            Err(ApplicationError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotation_and_reuse_detection() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid offline_access").await;
        let first = f.service.exchange_token(code_request(&code)).await.unwrap();
        let first_refresh = first.refresh_token.clone().unwrap();

        let second = f
            .service
            .exchange_token(refresh_request(&first_refresh))
            .await
            .unwrap();
        let second_refresh = second.refresh_token.clone().unwrap();
        assert_ne!(first_refresh, second_refresh);
        assert!(second.id_token.is_some());
        f.service
            .validate_access_token(&second.access_token)
            .await
            .unwrap();

        // Replaying the rotated token kills the family, successor included
        let reuse = f
            .service
            .exchange_token(refresh_request(&first_refresh))
            .await
            .unwrap_err();
        assert_eq!(reuse.code(), "invalid_grant");
        assert_eq!(
            f.service
                .exchange_token(refresh_request(&second_refresh))
                .await
                .unwrap_err()
                .code(),
            "invalid_grant"
        );

        let stored = f
            .refresh_tokens
            .find_by_hash(&sha256_hex(&second_refresh))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.revoked_at.is_some());

        // Access tokens minted up to the moment of detection die with the family
        assert!(matches!(
            f.service.validate_access_token(&second.access_token).await,
            Err(ApplicationError::Authentication(AuthError::TokenRevoked))
        ));

        let history = f.history.all().await;
        assert!(history.iter().any(|e| e.method == LoginMethod::RefreshToken && e.success));
        assert!(history.iter().any(|e| e.failure_reason.as_deref() == Some("refresh_token_reuse")));
    }

    #[tokio::test]
    async fn test_lost_rotation_race_revokes_the_stored_successor() {
        let f = fixture_with(|store| Arc::new(LosesRotation(store))).await;
        let code = obtain_code(&f, "openid offline_access").await;
        let tokens = f.service.exchange_token(code_request(&code)).await.unwrap();

        let err = f
            .service
            .exchange_token(refresh_request(&tokens.refresh_token.unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_grant");

        let stored = f.refresh_tokens.all().await;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| t.revoked_at.is_some()));
        assert_eq!(stored[0].family_id, stored[1].family_id);
    }

    #[tokio::test]
    async fn test_refresh_token_is_bound_to_its_client() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid offline_access").await;
        let tokens = f.service.exchange_token(code_request(&code)).await.unwrap();
        let refresh = tokens.refresh_token.unwrap();

        let foreign = TokenRequest {
            client_id: Some("partner".into()),
            ..refresh_request(&refresh)
        };
        assert_eq!(
            f.service.exchange_token(foreign).await.unwrap_err().code(),
            "invalid_grant"
        );

        // The rightful client is unaffected
        f.service
            .exchange_token(refresh_request(&refresh))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_code_is_bound_to_its_client() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid").await;

        let foreign = TokenRequest {
            client_id: Some("partner".into()),
            ..code_request(&code)
        };
        assert_eq!(
            f.service.exchange_token(foreign).await.unwrap_err().code(),
            "invalid_grant"
        );
        assert_eq!(
            f.service.exchange_token(code_request(&code)).await.unwrap_err().code(),
            "invalid_grant"
        );
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected_even_if_still_stored() {
        let f = fixture().await;
        let now = Utc::now().timestamp();
        let grant = |expires_at: i64| AuthorizationCode {
            user_id: f.login.user_id,
            client_id: "portal".into(),
            redirect_uri: REDIRECT.into(),
            scopes: ScopeSet::parse("openid").unwrap(),
            nonce: None,
            code_challenge: CodeChallenge::new(CHALLENGE.into()).unwrap(),
            auth_time: now - 600,
            expires_at,
        };

        f.sessions
            .save_code("stale-code", &grant(now - 1), Duration::from_secs(60))
            .await
            .unwrap();
        let err = f
            .service
            .exchange_token(code_request("stale-code"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_grant");

        f.sessions
            .save_code("fresh-code", &grant(now + 60), Duration::from_secs(60))
            .await
            .unwrap();
        f.service
            .exchange_token(code_request("fresh-code"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_scope_must_narrow() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid offline_access").await;
        let tokens = f.service.exchange_token(code_request(&code)).await.unwrap();
        let refresh = tokens.refresh_token.unwrap();

        let wider = TokenRequest {
            scope: Some("openid email offline_access".into()),
            ..refresh_request(&refresh)
        };
        assert_eq!(
            f.service.exchange_token(wider).await.unwrap_err().code(),
            "invalid_scope"
        );

        let narrower = TokenRequest {
            scope: Some("offline_access".into()),
            ..refresh_request(&refresh)
        };
        let narrowed = f.service.exchange_token(narrower).await.unwrap();
        assert!(narrowed.id_token.is_none());
        assert_eq!(narrowed.scope.to_string(), "offline_access");
    }

    #[tokio::test]
    async fn test_revoke_refresh_and_access_tokens() {
        let f = fixture().await;
        let code = obtain_code(&f, "openid offline_access").await;
        let tokens = f.service.exchange_token(code_request(&code)).await.unwrap();

        let revoke = |token: &str| RevokeRequest {
            token: Some(token.into()),
            client_id: Some("portal".into()),
            ..RevokeRequest::default()
        };

        f.service.revoke(revoke("not-a-token")).await.unwrap();

        let refresh = tokens.refresh_token.clone().unwrap();
        f.service.revoke(revoke(&refresh)).await.unwrap();
        assert_eq!(
            f.service
                .exchange_token(refresh_request(&refresh))
                .await
                .unwrap_err()
                .code(),
            "invalid_grant"
        );

        f.service.revoke(revoke(&tokens.access_token)).await.unwrap();
        assert!(matches!(
            f.service.validate_access_token(&tokens.access_token).await,
            Err(ApplicationError::Authentication(AuthError::TokenRevoked))
        ));
    }

    #[test]
    fn test_settings_trim_issuer() {
        let settings = ConnectSettings::from(&ConnectConfig {
            issuer: "https://id.example/".into(),
            ..ConnectConfig::default()
        });
        assert_eq!(settings.issuer, "https://id.example");
        assert_eq!(settings.code_ttl, Duration::from_secs(300));
    }
}
