//! AuditHub Core - Identity and community engine behind the AuditHub portal
//!
//! # Modules
//!
//! - [`config`] - Strongly-typed configuration with TOML and environment variable support
//! - [`domain`] - Entities, value objects, and repository traits for accounts,
//!   the OpenID Connect provider, SSO federation, and community feedback
//! - [`application`] - Use cases: password and SSO sign-in, authorization
//!   code + PKCE, refresh rotation, comments, ratings, reputation
//! - [`infrastructure`] - PostgreSQL and in-memory repositories, cache,
//!   rate limiting, JWT signing, and provider HTTP clients
//! - [`logging`] - Structured logging with tracing
//!
//! # Architecture
//!
//! ```text
//! audithub-core/
//! ├── domain/           # auth, connect, sso, community
//! ├── application/      # Use cases and services
//! ├── infrastructure/   # sqlx, Dragonfly/moka, reqwest, jsonwebtoken
//! └── config/           # Configuration management
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! use audithub_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `AUDITHUB__` prefix with double underscore separators:
//!
//! ```bash
//! AUDITHUB__SERVER__PORT=3000
//! AUDITHUB__AUTH__JWT_SECRET=...
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
