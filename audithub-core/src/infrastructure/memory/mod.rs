//! In-process repository implementations
//!
//! Back `database.backend = "memory"` for single-node demos and every
//! integration suite. State lives behind `tokio::sync::RwLock` and is lost on
//! restart.

pub mod auth;
pub mod community;
pub mod connect;

pub use auth::{InMemoryExternalLoginRepository, InMemoryLoginHistoryRepository, InMemoryLoginRepository};
pub use community::{
    InMemoryCommentRepository, InMemoryRatingRepository, InMemoryReputationRepository,
    InMemoryVoteRepository,
};
pub use connect::InMemoryRefreshTokenRepository;
