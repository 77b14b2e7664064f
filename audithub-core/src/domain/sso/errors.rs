//! SSO federation errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SsoError {
    #[error("SSO provider '{provider}' is not available")]
    ProviderUnavailable { provider: String },

    #[error("SSO state is missing, expired, or already used")]
    InvalidState,

    #[error("SSO state was issued for '{expected}' but the callback came from '{actual}'")]
    ProviderMismatch { expected: String, actual: String },

    #[error("Provider returned an error: {error}")]
    ProviderDenied { error: String },

    #[error("Code exchange with provider failed: {message}")]
    ExchangeFailed { message: String },

    #[error("Provider did not supply a verified email address")]
    EmailNotVerified,

    #[error("Avatar rejected: {reason}")]
    AvatarRejected { reason: String },
}
