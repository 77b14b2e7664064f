//! OAuth2 protocol errors (RFC 6749 §4.1.2.1 and §5.2)

use thiserror::Error;

/// Errors surfaced to relying parties with their registered error code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("server_error: {0}")]
    ServerError(String),

    #[error("temporarily_unavailable: {0}")]
    TemporarilyUnavailable(String),
}

impl ConnectError {
    /// The `error` value of the OAuth2 error response
    pub fn code(&self) -> &'static str {
        match self {
            ConnectError::InvalidRequest(_) => "invalid_request",
            ConnectError::InvalidClient(_) => "invalid_client",
            ConnectError::InvalidGrant(_) => "invalid_grant",
            ConnectError::UnauthorizedClient(_) => "unauthorized_client",
            ConnectError::UnsupportedGrantType(_) => "unsupported_grant_type",
            ConnectError::UnsupportedResponseType(_) => "unsupported_response_type",
            ConnectError::InvalidScope(_) => "invalid_scope",
            ConnectError::AccessDenied(_) => "access_denied",
            ConnectError::ServerError(_) => "server_error",
            ConnectError::TemporarilyUnavailable(_) => "temporarily_unavailable",
        }
    }

    /// The `error_description` value
    pub fn description(&self) -> &str {
        match self {
            ConnectError::InvalidRequest(d)
            | ConnectError::InvalidClient(d)
            | ConnectError::InvalidGrant(d)
            | ConnectError::UnauthorizedClient(d)
            | ConnectError::UnsupportedGrantType(d)
            | ConnectError::UnsupportedResponseType(d)
            | ConnectError::InvalidScope(d)
            | ConnectError::AccessDenied(d)
            | ConnectError::ServerError(d)
            | ConnectError::TemporarilyUnavailable(d) => d,
        }
    }
}

/// An /authorize failure and, once the redirect URI is trusted, where to send it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct AuthorizeError {
    pub error: ConnectError,
    /// Set only after client and redirect_uri have been verified
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

impl AuthorizeError {
    /// Rendered directly to the user agent, never redirected
    pub fn direct(error: ConnectError) -> Self {
        Self {
            error,
            redirect_uri: None,
            state: None,
        }
    }

    pub fn redirected(error: ConnectError, redirect_uri: &str, state: Option<&str>) -> Self {
        Self {
            error,
            redirect_uri: Some(redirect_uri.to_string()),
            state: state.map(str::to_string),
        }
    }

    /// Location carrying the error back to the client, if redirecting is safe
    pub fn redirect_location(&self) -> Option<String> {
        let redirect_uri = self.redirect_uri.as_deref()?;
        let mut params = vec![
            ("error", self.error.code()),
            ("error_description", self.error.description()),
        ];
        if let Some(state) = self.state.as_deref() {
            params.push(("state", state));
        }
        Some(append_query(redirect_uri, &params))
    }
}

/// Append query parameters to a URI that may already carry a query string
pub fn append_query(uri: &str, params: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    let encoded = serializer.finish();
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_errors_have_no_location() {
        let err = AuthorizeError::direct(ConnectError::InvalidClient("unknown".into()));
        assert!(err.redirect_location().is_none());
    }

    #[test]
    fn redirected_errors_carry_state_and_encoding() {
        let err = AuthorizeError::redirected(
            ConnectError::InvalidScope("scope 'openid' is required".into()),
            "https://rp.example/cb",
            Some("xyz 1"),
        );
        let location = err.redirect_location().unwrap();
        assert!(location.starts_with("https://rp.example/cb?error=invalid_scope&"));
        assert!(location.contains("state=xyz+1"));
        assert!(location.contains("error_description=scope+%27openid%27+is+required"));
    }

    #[test]
    fn append_query_respects_existing_query() {
        assert_eq!(
            append_query("https://rp.example/cb?tenant=a", &[("code", "c")]),
            "https://rp.example/cb?tenant=a&code=c"
        );
    }
}
