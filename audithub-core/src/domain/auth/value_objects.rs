//! Account value objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Login (account) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new random UserId
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<UserId> for Uuid {
    fn from(user_id: UserId) -> Self {
        user_id.0
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Email value object, normalized to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Create a new Email with validation
    pub fn new(email: String) -> Result<Self, String> {
        let email = email.trim().to_lowercase();

        if email.is_empty() {
            return Err("Email cannot be empty".to_string());
        }

        let Some((local, domain)) = email.split_once('@') else {
            return Err("Invalid email format: missing @ symbol".to_string());
        };

        if domain.contains('@') {
            return Err("Invalid email format: multiple @ symbols".to_string());
        }

        if local.is_empty() {
            return Err("Invalid email format: empty local part".to_string());
        }

        if domain.is_empty() || !domain.contains('.') || domain.starts_with('.') {
            return Err("Invalid email format: bad domain part".to_string());
        }

        if email.chars().any(char::is_whitespace) {
            return Err("Invalid email format: contains whitespace".to_string());
        }

        if email.len() > 255 {
            return Err("Email too long (max 255 characters)".to_string());
        }

        Ok(Email(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for Email {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public handle shown next to comments and ratings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 32;

    pub fn new(username: String) -> Result<Self, String> {
        let username = username.trim().to_string();
        let len = username.chars().count();
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&len) {
            return Err(format!(
                "Username must be {}-{} characters",
                Self::MIN_LENGTH,
                Self::MAX_LENGTH
            ));
        }
        if !username.chars().all(Self::is_allowed_char) {
            return Err(
                "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
            );
        }
        Ok(Self(username))
    }

    /// Derive a valid username from a free-form display name (SSO profiles).
    ///
    /// Disallowed characters are dropped; the result is padded or truncated to
    /// fit the length bounds.
    pub fn derive_from(display_name: &str) -> Self {
        let mut candidate: String = display_name
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .filter(|c| Self::is_allowed_char(*c))
            .take(Self::MAX_LENGTH)
            .collect();
        while candidate.chars().count() < Self::MIN_LENGTH {
            candidate.push('_');
        }
        Self(candidate)
    }

    /// Same handle with a numeric suffix, kept within the length limit
    pub fn with_suffix(&self, suffix: u32) -> Self {
        let suffix = suffix.to_string();
        let keep = Self::MAX_LENGTH.saturating_sub(suffix.len());
        let base: String = self.0.chars().take(keep).collect();
        Self(format!("{base}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_allowed_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Password validation result containing details about why validation failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordValidationError {
    pub message: String,
    pub missing_requirements: Vec<String>,
}

impl fmt::Display for PasswordValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Plaintext password accepted at registration.
///
/// Requirements:
/// - 8 to 128 characters
/// - at least one letter
/// - at least one digit
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub const MIN_LENGTH: usize = 8;
    pub const MAX_LENGTH: usize = 128;

    pub fn new(password: String) -> Result<Self, PasswordValidationError> {
        Self::validate(&password)?;
        Ok(Password(password))
    }

    pub fn validate(password: &str) -> Result<(), PasswordValidationError> {
        let mut missing = Vec::new();
        let len = password.chars().count();

        if len < Self::MIN_LENGTH {
            missing.push(format!("at least {} characters", Self::MIN_LENGTH));
        }
        if len > Self::MAX_LENGTH {
            missing.push(format!("at most {} characters", Self::MAX_LENGTH));
        }
        if !password.chars().any(|c| c.is_alphabetic()) {
            missing.push("at least one letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            missing.push("at least one digit".to_string());
        }

        if !missing.is_empty() {
            return Err(PasswordValidationError {
                message: format!("Password must contain: {}", missing.join(", ")),
                missing_requirements: missing,
            });
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Password hash value object (never exposes raw hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Intentionally not implementing Display or Serialize to prevent accidental exposure
impl From<String> for PasswordHash {
    fn from(hash: String) -> Self {
        Self(hash)
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Auditor,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn all() -> Vec<UserRole> {
        vec![
            UserRole::User,
            UserRole::Auditor,
            UserRole::Moderator,
            UserRole::Admin,
        ]
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Roles that may moderate community content regardless of reputation
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "auditor" => Ok(UserRole::Auditor),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserRole::User => "user",
            UserRole::Auditor => "auditor",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// How a login attempt authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginMethod {
    Password,
    Sso(String),
    RefreshToken,
}

impl LoginMethod {
    pub fn as_string(&self) -> String {
        match self {
            LoginMethod::Password => "password".to_string(),
            LoginMethod::Sso(provider) => format!("sso:{provider}"),
            LoginMethod::RefreshToken => "refresh_token".to_string(),
        }
    }
}

impl FromStr for LoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(LoginMethod::Password),
            "refresh_token" => Ok(LoginMethod::RefreshToken),
            other => other
                .strip_prefix("sso:")
                .filter(|provider| !provider.is_empty())
                .map(|provider| LoginMethod::Sso(provider.to_string()))
                .ok_or_else(|| format!("Unknown login method: {}", s)),
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}
