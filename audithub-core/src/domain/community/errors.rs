//! Community domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommunityError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Requires the '{privilege}' privilege")]
    InsufficientReputation { privilege: String },

    #[error("Content rejected: {}", violations.join(", "))]
    ContentRejected { violations: Vec<String> },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },
}

impl From<sqlx::Error> for CommunityError {
    fn from(error: sqlx::Error) -> Self {
        CommunityError::DatabaseError {
            message: error.to_string(),
        }
    }
}
