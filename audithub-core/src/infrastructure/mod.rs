//! Infrastructure Layer - External concerns and implementations
//!
//! PostgreSQL repositories, the Dragonfly/moka cache, rate limiting, and the
//! HTTP clients that talk to upstream identity providers.

pub mod auth;
pub mod cache;
pub mod community;
pub mod connect;
pub mod memory;
pub mod rate_limiter;
pub mod sso;

pub use cache::*;
