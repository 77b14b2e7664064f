//! Account domain errors

use thiserror::Error;

/// Authentication-specific domain errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid credentials provided")]
    InvalidCredentials,

    #[error("Invalid token provided")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Email already exists: {email}")]
    EmailAlreadyExists { email: String },

    #[error("Username already taken: {username}")]
    UsernameTaken { username: String },

    #[error("Invalid email format: {email}")]
    InvalidEmail { email: String },

    #[error("Invalid username: {reason}")]
    InvalidUsername { reason: String },

    #[error("Password does not meet requirements: {requirements}")]
    PasswordRequirementsNotMet { requirements: String },

    #[error(
        "Account temporarily locked due to too many failed login attempts. Try again in {retry_after_seconds} seconds."
    )]
    AccountLocked { retry_after_seconds: u64 },

    #[error("User ID not found: {user_id}")]
    UserIdNotFound { user_id: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Password hashing failed")]
    HashingFailed,
}

impl From<sqlx::Error> for AuthError {
    fn from(error: sqlx::Error) -> Self {
        AuthError::DatabaseError {
            message: error.to_string(),
        }
    }
}
