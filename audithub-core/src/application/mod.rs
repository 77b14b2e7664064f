//! Application layer - use cases and services orchestrating domain and infrastructure

pub mod auth;
pub mod cache;
pub mod community;
pub mod connect;
pub mod errors;
pub mod sso;
