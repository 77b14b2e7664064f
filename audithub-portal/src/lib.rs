//! AuditHub Portal - HTTP API for the AuditHub identity provider and community
//!
//! This crate exposes `audithub-core` over HTTP: an OpenID Connect provider
//! (authorization code with PKCE), Google and Discord sign-in, account
//! management, and comments, votes, and ratings on published audit reports.
//!
//! # Architecture
//!
//! ```text
//! audithub-portal/
//! ├── bootstrap.rs      # Service wiring from config
//! └── presentation/     # HTTP layer
//!     ├── auth/         # Bearer token extractors
//!     ├── controllers/  # Request handlers
//!     ├── middleware/   # Error rendering, security headers, rate limiting
//!     ├── models.rs     # DTOs with OpenAPI schemas
//!     └── routes.rs     # Route table and middleware stack
//! ```
//!
//! # API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/.well-known/openid-configuration` | GET | Provider metadata |
//! | `/connect/authorize` | GET | Start an authorization |
//! | `/connect/login` | POST | Password step of an authorization |
//! | `/connect/token` | POST | Code and refresh token exchange |
//! | `/connect/revoke` | POST | Token revocation |
//! | `/connect/userinfo` | GET | Claims for a bearer token |
//! | `/connect/sso/{provider}` | GET | Sign in through Google or Discord |
//! | `/api/v1/account/register` | POST | Create a password account |
//! | `/api/v1/reports/{id}/comments` | GET, POST | Report comments |
//! | `/api/v1/reports/{id}/ratings` | PUT | Rate a report |
//! | `/health` | GET | Health check |

pub mod bootstrap;
pub mod presentation;

pub use bootstrap::{PortalDependencies, Repositories};
pub use presentation::{ApiDoc, PortalState, create_router};
