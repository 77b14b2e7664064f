//! Domain layer - pure business types and repository seams

pub mod auth;
pub mod community;
pub mod connect;
pub mod sso;
