//! Authentication infrastructure services

pub mod brute_force_protection;
pub mod jwt_service;
pub mod login_history_repository;
pub mod login_repository;
pub mod password_hasher;
pub mod token_blacklist;

pub use brute_force_protection::{
    BruteForceConfig, BruteForceProtection, CacheBruteForceProtection, LoginAttemptData,
    LoginPermission,
};
pub use jwt_service::{IdTokenParams, JwtService};
pub use login_history_repository::SqlxLoginHistoryRepository;
pub use login_repository::{SqlxExternalLoginRepository, SqlxLoginRepository};
pub use password_hasher::PasswordHasher;
pub use token_blacklist::{CacheTokenBlacklistService, TokenBlacklistService};
