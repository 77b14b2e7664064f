//! Account domain entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::value_objects::*;

/// Local account aggregate root
#[derive(Debug, Clone)]
pub struct Login {
    pub user_id: UserId,
    pub email: Email,
    pub username: Username,
    /// `None` for accounts created through SSO that never set a password
    pub password_hash: Option<PasswordHash>,
    pub roles: Vec<UserRole>,
    pub email_verified: bool,
    /// Content type of the stored avatar, if any
    pub avatar_content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Login {
    /// Create a password-backed account with the default role
    pub fn new_with_password(email: Email, username: Username, password_hash: PasswordHash) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::generate(),
            email,
            username,
            password_hash: Some(password_hash),
            roles: vec![UserRole::User],
            email_verified: false,
            avatar_content_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an account for a federated identity; the provider vouched for the email
    pub fn new_federated(email: Email, username: Username) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::generate(),
            email,
            username,
            password_hash: None,
            roles: vec![UserRole::User],
            email_verified: true,
            avatar_content_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn can_moderate(&self) -> bool {
        self.roles.iter().any(|r| r.can_moderate())
    }

    pub fn has_avatar(&self) -> bool {
        self.avatar_content_type.is_some()
    }

    pub fn add_role(&mut self, role: UserRole) {
        if !self.roles.contains(&role) {
            self.roles.push(role);
            self.updated_at = Utc::now();
        }
    }

    pub fn mark_email_verified(&mut self) {
        if !self.email_verified {
            self.email_verified = true;
            self.updated_at = Utc::now();
        }
    }
}

/// Link between a local account and an identity at an SSO provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLogin {
    pub provider: String,
    /// Provider-side subject identifier (stable user id at the provider)
    pub subject: String,
    pub user_id: UserId,
    pub linked_at: DateTime<Utc>,
}

impl ExternalLogin {
    pub fn new(provider: impl Into<String>, subject: impl Into<String>, user_id: UserId) -> Self {
        Self {
            provider: provider.into(),
            subject: subject.into(),
            user_id,
            linked_at: Utc::now(),
        }
    }
}

/// Stored avatar image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// One entry in the login audit trail
#[derive(Debug, Clone)]
pub struct LoginHistoryEntry {
    pub id: Uuid,
    /// `None` when the attempt named an unknown account
    pub user_id: Option<UserId>,
    /// SHA-256 of the normalized identifier that was presented
    pub identifier_hash: String,
    pub method: LoginMethod,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub client_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LoginHistoryEntry {
    pub const MAX_USER_AGENT_LEN: usize = 512;
}

/// Where a login attempt came from
#[derive(Debug, Clone, Default)]
pub struct LoginContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub client_id: Option<String>,
}

impl LoginContext {
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::new("auditor@example.com".to_string()).unwrap()
    }

    #[test]
    fn federated_login_has_no_password_and_verified_email() {
        let login = Login::new_federated(email(), Username::derive_from("auditor"));
        assert!(login.password_hash.is_none());
        assert!(login.email_verified);
        assert_eq!(login.roles, vec![UserRole::User]);
    }

    #[test]
    fn add_role_is_idempotent() {
        let mut login = Login::new_with_password(
            email(),
            Username::derive_from("auditor"),
            PasswordHash::new("hash".to_string()),
        );
        login.add_role(UserRole::Moderator);
        login.add_role(UserRole::Moderator);
        assert_eq!(login.roles.len(), 2);
        assert!(login.can_moderate());
    }
}
