//! Account use cases

use std::sync::Arc;

use super::login_history::{LoginAttempt, LoginHistoryRecorder};
use crate::application::errors::ApplicationError;
use crate::domain::auth::{
    entities::{Avatar, Login, LoginContext, LoginHistoryEntry},
    errors::AuthError,
    repositories::{ILoginHistoryRepository, ILoginRepository},
    value_objects::{Email, LoginMethod, Password, UserId, Username},
};
use crate::infrastructure::auth::{BruteForceProtection, PasswordHasher};

/// Use case for registering a password account
pub struct RegisterUseCase {
    login_repository: Arc<dyn ILoginRepository>,
    password_hasher: Arc<PasswordHasher>,
}

impl RegisterUseCase {
    pub fn new(
        login_repository: Arc<dyn ILoginRepository>,
        password_hasher: Arc<PasswordHasher>,
    ) -> Self {
        Self {
            login_repository,
            password_hasher,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn execute(
        &self,
        email: String,
        username: String,
        password: String,
    ) -> Result<Login, ApplicationError> {
        let email = Email::new(email.clone()).map_err(|_| AuthError::InvalidEmail { email })?;
        let username =
            Username::new(username).map_err(|reason| AuthError::InvalidUsername { reason })?;
        let password = Password::new(password).map_err(|e| AuthError::PasswordRequirementsNotMet {
            requirements: e.missing_requirements.join(", "),
        })?;

        if self.login_repository.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists {
                email: email.as_str().to_string(),
            }
            .into());
        }
        if self.login_repository.username_exists(&username).await? {
            return Err(AuthError::UsernameTaken {
                username: username.as_str().to_string(),
            }
            .into());
        }

        let password_hash = self.password_hasher.hash(&password).await?;
        let login = Login::new_with_password(email, username, password_hash);
        self.login_repository.create(&login).await?;

        tracing::info!(user_id = %login.user_id, "Account registered");
        Ok(login)
    }
}

/// Use case for email and password authentication.
///
/// Unknown accounts, SSO-only accounts, and wrong passwords are
/// indistinguishable to the caller.
pub struct AuthenticatePasswordUseCase {
    login_repository: Arc<dyn ILoginRepository>,
    password_hasher: Arc<PasswordHasher>,
    brute_force: Arc<dyn BruteForceProtection>,
    history: Arc<LoginHistoryRecorder>,
}

impl AuthenticatePasswordUseCase {
    pub fn new(
        login_repository: Arc<dyn ILoginRepository>,
        password_hasher: Arc<PasswordHasher>,
        brute_force: Arc<dyn BruteForceProtection>,
        history: Arc<LoginHistoryRecorder>,
    ) -> Self {
        Self {
            login_repository,
            password_hasher,
            brute_force,
            history,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn execute(
        &self,
        email: &str,
        password: String,
        context: &LoginContext,
    ) -> Result<Login, ApplicationError> {
        let identifier = email.trim().to_lowercase();

        let Ok(email) = Email::new(identifier.clone()) else {
            self.fail(None, &identifier, "invalid_email", context).await;
            return Err(AuthError::InvalidCredentials.into());
        };

        if let Err(locked) = self
            .brute_force
            .check_login_allowed(&identifier)
            .await?
            .into_result()
        {
            self.fail(None, &identifier, "locked", context).await;
            return Err(locked.into());
        }

        let Some(login) = self.login_repository.find_by_email(&email).await? else {
            self.password_hasher.verify_dummy(password).await?;
            self.brute_force.record_failed_attempt(&identifier).await?;
            self.fail(None, &identifier, "unknown_account", context).await;
            return Err(AuthError::InvalidCredentials.into());
        };

        let Some(password_hash) = login.password_hash.clone() else {
            self.password_hasher.verify_dummy(password).await?;
            self.brute_force.record_failed_attempt(&identifier).await?;
            self.fail(Some(login.user_id), &identifier, "no_password", context)
                .await;
            return Err(AuthError::InvalidCredentials.into());
        };

        if !self.password_hasher.verify(password, password_hash).await? {
            self.brute_force.record_failed_attempt(&identifier).await?;
            self.fail(Some(login.user_id), &identifier, "invalid_password", context)
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }

        self.brute_force.record_successful_login(&identifier).await?;
        self.history
            .record(
                LoginAttempt {
                    user_id: Some(login.user_id),
                    identifier: &identifier,
                    method: LoginMethod::Password,
                    success: true,
                    failure_reason: None,
                },
                context,
            )
            .await;

        tracing::info!(user_id = %login.user_id, "Password login succeeded");
        Ok(login)
    }

    async fn fail(
        &self,
        user_id: Option<UserId>,
        identifier: &str,
        reason: &str,
        context: &LoginContext,
    ) {
        tracing::warn!(reason, "Password login failed");
        self.history
            .record(
                LoginAttempt {
                    user_id,
                    identifier,
                    method: LoginMethod::Password,
                    success: false,
                    failure_reason: Some(reason),
                },
                context,
            )
            .await;
    }
}

pub struct GetProfileUseCase {
    login_repository: Arc<dyn ILoginRepository>,
}

impl GetProfileUseCase {
    pub fn new(login_repository: Arc<dyn ILoginRepository>) -> Self {
        Self { login_repository }
    }

    pub async fn execute(&self, user_id: &UserId) -> Result<Login, ApplicationError> {
        self.login_repository
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| {
                AuthError::UserIdNotFound {
                    user_id: user_id.to_string(),
                }
                .into()
            })
    }
}

pub struct GetAvatarUseCase {
    login_repository: Arc<dyn ILoginRepository>,
}

impl GetAvatarUseCase {
    pub fn new(login_repository: Arc<dyn ILoginRepository>) -> Self {
        Self { login_repository }
    }

    pub async fn execute(&self, user_id: &UserId) -> Result<Avatar, ApplicationError> {
        self.login_repository
            .find_avatar(user_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "avatar".to_string(),
                id: user_id.to_string(),
            })
    }
}

/// Login history for the signed-in user, newest first
pub struct ListLoginHistoryUseCase {
    history_repository: Arc<dyn ILoginHistoryRepository>,
}

impl ListLoginHistoryUseCase {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(history_repository: Arc<dyn ILoginHistoryRepository>) -> Self {
        Self { history_repository }
    }

    pub async fn execute(
        &self,
        user_id: &UserId,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<LoginHistoryEntry>, ApplicationError> {
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        Ok(self
            .history_repository
            .list_for_user(user_id, limit, offset.unwrap_or(0))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::auth::{BruteForceConfig, CacheBruteForceProtection};
    use crate::infrastructure::cache::MemoryCache;
    use crate::infrastructure::memory::{InMemoryLoginHistoryRepository, InMemoryLoginRepository};

    struct Fixture {
        logins: Arc<InMemoryLoginRepository>,
        history: Arc<InMemoryLoginHistoryRepository>,
        register: RegisterUseCase,
        authenticate: AuthenticatePasswordUseCase,
    }

    fn fixture(max_attempts: u32) -> Fixture {
        let logins = Arc::new(InMemoryLoginRepository::new());
        let history = Arc::new(InMemoryLoginHistoryRepository::new());
        let hasher = Arc::new(PasswordHasher::with_params(4096, 1, 1).unwrap());
        let brute_force = Arc::new(CacheBruteForceProtection::new(
            Arc::new(MemoryCache::new(100)),
            BruteForceConfig {
                max_attempts,
                ..BruteForceConfig::default()
            },
        ));
        Fixture {
            register: RegisterUseCase::new(logins.clone(), hasher.clone()),
            authenticate: AuthenticatePasswordUseCase::new(
                logins.clone(),
                hasher,
                brute_force,
                Arc::new(LoginHistoryRecorder::new(history.clone())),
            ),
            logins,
            history,
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let f = fixture(5);
        f.register
            .execute("a@example.com".into(), "alice".into(), "password1".into())
            .await
            .unwrap();

        let dup_email = f
            .register
            .execute("A@Example.com".into(), "other".into(), "password1".into())
            .await;
        assert!(matches!(
            dup_email,
            Err(ApplicationError::Authentication(AuthError::EmailAlreadyExists { .. }))
        ));

        let dup_username = f
            .register
            .execute("b@example.com".into(), "alice".into(), "password1".into())
            .await;
        assert!(matches!(
            dup_username,
            Err(ApplicationError::Authentication(AuthError::UsernameTaken { .. }))
        ));
    }

    #[tokio::test]
    async fn test_register_validates_password() {
        let f = fixture(5);
        let result = f
            .register
            .execute("a@example.com".into(), "alice".into(), "short".into())
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Authentication(AuthError::PasswordRequirementsNotMet { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_wrong_password_look_the_same() {
        let f = fixture(5);
        f.register
            .execute("a@example.com".into(), "alice".into(), "password1".into())
            .await
            .unwrap();
        let ctx = LoginContext::default();

        let unknown = f
            .authenticate
            .execute("ghost@example.com", "password1".into(), &ctx)
            .await
            .unwrap_err();
        let wrong = f
            .authenticate
            .execute("a@example.com", "password2".into(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());

        let entries = f.history.all().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].user_id.is_none());
        assert!(entries[1].user_id.is_some());
        assert!(entries.iter().all(|e| !e.success));
    }

    #[tokio::test]
    async fn test_sso_only_account_cannot_use_password() {
        let f = fixture(5);
        let login = Login::new_federated(
            Email::new("sso@example.com".into()).unwrap(),
            Username::new("sso_user".into()).unwrap(),
        );
        f.logins.create(&login).await.unwrap();

        let result = f
            .authenticate
            .execute("sso@example.com", "password1".into(), &LoginContext::default())
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Authentication(AuthError::InvalidCredentials))
        ));
    }

    #[tokio::test]
    async fn test_accounts_without_a_hash_still_pay_for_one() {
        let f = fixture(50);
        f.register
            .execute("a@example.com".into(), "alice".into(), "password1".into())
            .await
            .unwrap();
        let sso = Login::new_federated(
            Email::new("sso@example.com".into()).unwrap(),
            Username::new("sso_user".into()).unwrap(),
        );
        f.logins.create(&sso).await.unwrap();
        let ctx = LoginContext::default();

        let timed = |email: &'static str| {
            let authenticate = &f.authenticate;
            let ctx = &ctx;
            async move {
                let started = std::time::Instant::now();
                let _ = authenticate.execute(email, "password2".into(), ctx).await;
                started.elapsed()
            }
        };

        let wrong = timed("a@example.com").await;
        let unknown = timed("ghost@example.com").await;
        let sso_only = timed("sso@example.com").await;
        assert!(unknown * 4 >= wrong, "unknown {unknown:?} vs wrong {wrong:?}");
        assert!(sso_only * 4 >= wrong, "sso {sso_only:?} vs wrong {wrong:?}");
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let f = fixture(2);
        f.register
            .execute("a@example.com".into(), "alice".into(), "password1".into())
            .await
            .unwrap();
        let ctx = LoginContext::default();

        for _ in 0..2 {
            let _ = f
                .authenticate
                .execute("a@example.com", "wrong-pass1".into(), &ctx)
                .await;
        }

        // Even the right password is refused while locked
        let result = f
            .authenticate
            .execute("a@example.com", "password1".into(), &ctx)
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Authentication(AuthError::AccountLocked { .. }))
        ));
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let f = fixture(5);
        let registered = f
            .register
            .execute("a@example.com".into(), "alice".into(), "password1".into())
            .await
            .unwrap();
        let ctx = LoginContext {
            ip: Some("198.51.100.1".into()),
            user_agent: Some("tests".into()),
            client_id: Some("portal".into()),
        };

        let login = f
            .authenticate
            .execute(" A@example.com ", "password1".into(), &ctx)
            .await
            .unwrap();
        assert_eq!(login.user_id, registered.user_id);

        let history = ListLoginHistoryUseCase::new(f.history.clone())
            .execute(&login.user_id, Some(500), None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].client_id.as_deref(), Some("portal"));
    }
}
