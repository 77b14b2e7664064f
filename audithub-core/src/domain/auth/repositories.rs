//! Account repository traits

use async_trait::async_trait;

use super::entities::{Avatar, ExternalLogin, Login, LoginHistoryEntry};
use super::errors::AuthError;
use super::value_objects::{Email, UserId, Username};

/// Persistence for local accounts
#[async_trait]
pub trait ILoginRepository: Send + Sync {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Login>, AuthError>;

    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<Login>, AuthError>;

    async fn username_exists(&self, username: &Username) -> Result<bool, AuthError>;

    /// Insert a new account; duplicate email or username map to the matching `AuthError`
    async fn create(&self, login: &Login) -> Result<(), AuthError>;

    async fn update(&self, login: &Login) -> Result<(), AuthError>;

    /// Store the avatar and record its content type on the account
    async fn save_avatar(&self, user_id: &UserId, avatar: &Avatar) -> Result<(), AuthError>;

    async fn find_avatar(&self, user_id: &UserId) -> Result<Option<Avatar>, AuthError>;
}

/// Persistence for SSO identity links
#[async_trait]
pub trait IExternalLoginRepository: Send + Sync {
    async fn find(&self, provider: &str, subject: &str) -> Result<Option<ExternalLogin>, AuthError>;

    async fn create(&self, link: &ExternalLogin) -> Result<(), AuthError>;

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<ExternalLogin>, AuthError>;
}

/// Append-only login audit trail
#[async_trait]
pub trait ILoginHistoryRepository: Send + Sync {
    async fn append(&self, entry: &LoginHistoryEntry) -> Result<(), AuthError>;

    /// Newest first
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LoginHistoryEntry>, AuthError>;
}
