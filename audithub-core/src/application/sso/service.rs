//! SSO federation: begin an upstream sign-in, then map the returned identity
//! onto a local login and resume the pending authorization request.

use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::provider::{AvatarFetcher, SsoProvider};
use crate::application::auth::{LoginAttempt, LoginHistoryRecorder};
use crate::application::connect::{ConnectService, random_token};
use crate::application::errors::ApplicationError;
use crate::domain::auth::{
    entities::{ExternalLogin, Login, LoginContext},
    errors::AuthError,
    repositories::{IExternalLoginRepository, ILoginRepository},
    value_objects::{Email, LoginMethod, Username},
};
use crate::domain::connect::{
    entities::AuthorizationRequest,
    errors::{ConnectError, append_query},
    value_objects::CodeVerifier,
};
use crate::domain::sso::{
    entities::{ExternalIdentity, ProviderKind, SsoState},
    errors::SsoError,
};

/// Attempts at a free `name`, `name1`, `name2`, ... before giving up on order
const USERNAME_SUFFIX_ATTEMPTS: u32 = 100;

/// Query parameters of a provider callback
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct SsoService {
    providers: HashMap<ProviderKind, Arc<dyn SsoProvider>>,
    connect: Arc<ConnectService>,
    logins: Arc<dyn ILoginRepository>,
    external_logins: Arc<dyn IExternalLoginRepository>,
    avatars: Arc<dyn AvatarFetcher>,
    history: Arc<LoginHistoryRecorder>,
}

impl SsoService {
    /// Only the providers passed here are reachable; disabled ones are left out
    pub fn new(
        providers: Vec<Arc<dyn SsoProvider>>,
        connect: Arc<ConnectService>,
        logins: Arc<dyn ILoginRepository>,
        external_logins: Arc<dyn IExternalLoginRepository>,
        avatars: Arc<dyn AvatarFetcher>,
        history: Arc<LoginHistoryRecorder>,
    ) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.kind(), p)).collect(),
            connect,
            logins,
            external_logins,
            avatars,
            history,
        }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn SsoProvider>, SsoError> {
        ProviderKind::from_str(name)
            .ok()
            .and_then(|kind| self.providers.get(&kind))
            .ok_or_else(|| SsoError::ProviderUnavailable {
                provider: name.to_string(),
            })
    }

    /// Start an upstream sign-in for a pending authorization request.
    ///
    /// Returns the provider's authorization URL.
    #[tracing::instrument(skip(self))]
    pub async fn begin(&self, provider: &str, request_id: &str) -> Result<String, ApplicationError> {
        let provider = self.provider(provider)?;
        let sessions = self.connect.sessions();

        if sessions.find_request(request_id).await?.is_none() {
            return Err(ConnectError::InvalidRequest(
                "authorization request is unknown or expired".into(),
            )
            .into());
        }

        let state = random_token();
        let verifier = CodeVerifier::new(random_token())
            .map_err(|message| ApplicationError::Validation { message })?;
        let sso_state = SsoState {
            provider: provider.kind(),
            request_id: request_id.to_string(),
            code_verifier: verifier.as_str().to_string(),
            created_at: Utc::now(),
        };
        sessions
            .save_sso_state(&state, &sso_state, self.connect.settings().request_ttl)
            .await?;

        tracing::info!(provider = %provider.kind(), "SSO sign-in started");
        Ok(provider.authorization_url(&state, &verifier.challenge()))
    }

    /// Finish an upstream sign-in.
    ///
    /// `Ok` carries the location to send the user agent to: the client's
    /// redirect URI with either a code or an OAuth error. `Err` means there
    /// is no trustworthy client redirect to report to.
    #[tracing::instrument(skip_all, fields(provider = %provider_name))]
    pub async fn callback(
        &self,
        provider_name: &str,
        params: CallbackParams,
        context: LoginContext,
    ) -> Result<String, ApplicationError> {
        let provider = self.provider(provider_name)?;
        let sessions = self.connect.sessions();

        if let Some(error) = params.error {
            tracing::warn!(provider = %provider.kind(), error = %error, "Provider returned an error");
            let pending = match params.state.as_deref() {
                Some(state) => sessions.take_sso_state(state).await?,
                None => None,
            };
            if let Some(pending) = pending
                && let Some(request) = sessions.take_request(&pending.request_id).await?
            {
                return Ok(Self::client_error(
                    &request,
                    ConnectError::AccessDenied("the user denied access at the identity provider".into()),
                ));
            }
            return Err(SsoError::ProviderDenied { error }.into());
        }

        let state = params.state.ok_or(SsoError::InvalidState)?;
        let pending = sessions
            .take_sso_state(&state)
            .await?
            .ok_or(SsoError::InvalidState)?;
        if pending.is_expired_at(Utc::now(), self.connect.settings().request_ttl) {
            tracing::warn!(provider = %provider.kind(), "SSO state outlived the request TTL");
            return Err(SsoError::InvalidState.into());
        }
        if pending.provider != provider.kind() {
            return Err(SsoError::ProviderMismatch {
                expected: pending.provider.to_string(),
                actual: provider.kind().to_string(),
            }
            .into());
        }

        let request = sessions
            .find_request(&pending.request_id)
            .await?
            .ok_or_else(|| {
                ConnectError::InvalidRequest("authorization request is unknown or expired".into())
            })?;
        let context = context.with_client(request.client_id.clone());

        let identity = match self
            .fetch_identity(provider.as_ref(), params.code.as_deref(), &pending.code_verifier)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(provider = %provider.kind(), error = %e, "SSO exchange failed");
                return self
                    .abandon(&request, ConnectError::ServerError("sign-in with the identity provider failed".into()))
                    .await;
            }
        };

        let email = match identity.email.as_deref().map(|e| Email::new(e.to_string())) {
            Some(Ok(email)) if identity.email_verified => email,
            _ => {
                self.record(&identity, None, false, Some("email_not_verified"), &context)
                    .await;
                return self
                    .abandon(
                        &request,
                        ConnectError::AccessDenied(SsoError::EmailNotVerified.to_string()),
                    )
                    .await;
            }
        };

        let mut login = self.resolve_login(&identity, email).await?;
        self.import_avatar(&mut login, &identity).await;
        self.record(&identity, Some(&login), true, None, &context).await;

        self.connect
            .complete_authorization(&request.id, &login, Utc::now().timestamp())
            .await
    }

    async fn fetch_identity(
        &self,
        provider: &dyn SsoProvider,
        code: Option<&str>,
        code_verifier: &str,
    ) -> Result<ExternalIdentity, SsoError> {
        let code = code.ok_or_else(|| SsoError::ExchangeFailed {
            message: "callback carried no code".into(),
        })?;
        let access_token = provider.exchange_code(code, code_verifier).await?;
        provider.fetch_identity(&access_token).await
    }

    /// Consume the pending request and report `error` to its client
    async fn abandon(
        &self,
        request: &AuthorizationRequest,
        error: ConnectError,
    ) -> Result<String, ApplicationError> {
        self.connect.sessions().take_request(&request.id).await?;
        Ok(Self::client_error(request, error))
    }

    fn client_error(request: &AuthorizationRequest, error: ConnectError) -> String {
        append_query(
            &request.redirect_uri,
            &[
                ("error", error.code()),
                ("error_description", error.description()),
                ("state", request.state.as_str()),
            ],
        )
    }

    /// Existing link, else an account with the same verified email, else a
    /// new password-less account
    async fn resolve_login(
        &self,
        identity: &ExternalIdentity,
        email: Email,
    ) -> Result<Login, ApplicationError> {
        let provider = identity.provider.as_str();

        if let Some(link) = self.external_logins.find(provider, &identity.subject).await? {
            return self
                .logins
                .find_by_id(&link.user_id)
                .await?
                .ok_or_else(|| {
                    AuthError::UserIdNotFound {
                        user_id: link.user_id.to_string(),
                    }
                    .into()
                });
        }

        let login = match self.logins.find_by_email(&email).await? {
            Some(mut existing) => {
                if !existing.email_verified {
                    existing.mark_email_verified();
                    self.logins.update(&existing).await?;
                }
                tracing::info!(user_id = %existing.user_id, provider, "Linking SSO identity to existing account");
                existing
            }
            None => self.create_federated(identity, email).await?,
        };

        self.external_logins
            .create(&ExternalLogin::new(provider, identity.subject.clone(), login.user_id))
            .await?;
        Ok(login)
    }

    async fn create_federated(
        &self,
        identity: &ExternalIdentity,
        email: Email,
    ) -> Result<Login, ApplicationError> {
        let seed = identity
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.as_str().split('@').next().unwrap_or_default().to_string());
        let base = Username::derive_from(&seed);

        let candidates = (0..USERNAME_SUFFIX_ATTEMPTS)
            .map(|n| if n == 0 { base.clone() } else { base.with_suffix(n) })
            .chain(std::iter::once(base.with_suffix(rand::random::<u32>() % 1_000_000)));

        for username in candidates {
            if self.logins.username_exists(&username).await? {
                continue;
            }
            let login = Login::new_federated(email.clone(), username);
            match self.logins.create(&login).await {
                Ok(()) => {
                    tracing::info!(user_id = %login.user_id, provider = %identity.provider, "Account created from SSO identity");
                    return Ok(login);
                }
                // Lost a race for the name; try the next one
                Err(AuthError::UsernameTaken { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApplicationError::Validation {
            message: "could not find a free username".into(),
        })
    }

    /// Best effort: a failed download never fails the sign-in
    async fn import_avatar(&self, login: &mut Login, identity: &ExternalIdentity) {
        if login.has_avatar() {
            return;
        }
        let Some(url) = identity.avatar_url.as_deref() else {
            return;
        };

        match self.avatars.fetch(url).await {
            Ok(avatar) => match self.logins.save_avatar(&login.user_id, &avatar).await {
                Ok(()) => login.avatar_content_type = Some(avatar.content_type),
                Err(e) => tracing::warn!(user_id = %login.user_id, error = %e, "Failed to store avatar"),
            },
            Err(e) => {
                tracing::warn!(user_id = %login.user_id, provider = %identity.provider, error = %e, "Avatar import skipped")
            }
        }
    }

    async fn record(
        &self,
        identity: &ExternalIdentity,
        login: Option<&Login>,
        success: bool,
        failure_reason: Option<&str>,
        context: &LoginContext,
    ) {
        let identifier = format!("{}:{}", identity.provider, identity.subject);
        self.history
            .record(
                LoginAttempt {
                    user_id: login.map(|l| l.user_id),
                    identifier: &identifier,
                    method: LoginMethod::Sso(identity.provider.to_string()),
                    success,
                    failure_reason,
                },
                context,
            )
            .await;
    }
}
