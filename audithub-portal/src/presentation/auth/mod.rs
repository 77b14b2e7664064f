//! Bearer authentication for portal handlers

pub mod extractors;

pub use extractors::{Auth, AuthErrorResponse, AuthState, OptionalAuth, bearer_token};
