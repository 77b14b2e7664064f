//! SSO federation application services

pub mod provider;
pub mod service;

pub use provider::{AvatarFetcher, SsoProvider};
pub use service::{CallbackParams, SsoService};
