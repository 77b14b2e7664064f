//! Application-level error types

use thiserror::Error;

use crate::domain::auth::errors::AuthError;
use crate::domain::community::errors::CommunityError;
use crate::domain::connect::errors::ConnectError;
use crate::domain::sso::errors::SsoError;

/// Cache backend failures
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache backend error: {message}")]
    Backend { message: String },

    #[error("Cache key not found: {key}")]
    KeyNotFound { key: String },
}

/// Top-level error for use cases and services
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("Authorization protocol error: {0}")]
    Connect(#[from] ConnectError),

    #[error("SSO error: {0}")]
    Sso(#[from] SsoError),

    #[error("Community error: {0}")]
    Community(#[from] CommunityError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },
}

impl From<sqlx::Error> for ApplicationError {
    fn from(error: sqlx::Error) -> Self {
        ApplicationError::Database {
            message: error.to_string(),
        }
    }
}

impl ApplicationError {
    pub fn cache_backend(message: impl Into<String>) -> Self {
        ApplicationError::Cache(CacheError::Backend {
            message: message.into(),
        })
    }
}
