//! OIDC authorization server application services

pub mod clients;
pub mod discovery;
pub mod service;
pub mod session;

pub use clients::ClientRegistry;
pub use discovery::DiscoveryDocument;
pub use service::{
    AuthorizeParams, ConnectComponents, ConnectService, ConnectSettings, RequestDescription,
    RevokeRequest, TokenRequest,
};
pub use session::AuthorizationSessionStore;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// 32 random bytes, base64url without padding (43 chars).
///
/// Used for request ids, authorization codes, refresh tokens, SSO states,
/// and upstream PKCE verifiers.
pub fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}
