//! Connect infrastructure: refresh token storage and authorization session state

pub mod refresh_token_repository;
pub mod session_store;

pub use refresh_token_repository::SqlxRefreshTokenRepository;
pub use session_store::CacheAuthorizationSessionStore;
