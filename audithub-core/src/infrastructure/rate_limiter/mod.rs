//! Rate Limiting Infrastructure
//!
//! - Token bucket for general API traffic, tiered by authenticated user or IP
//! - Sliding window counters for credential endpoints and community actions
//! - Dragonfly/Redis or in-memory storage

pub mod service;
pub mod sliding_window;
pub mod storage;
pub mod token_bucket;
pub mod types;

pub use service::RateLimiterService;
pub use sliding_window::{ActionLimitResult, AuthRateLimitResult};
pub use storage::{DragonflyRateLimitStorage, InMemoryRateLimitStorage, RateLimitStorage};
pub use types::{AuthEndpoint, AuthTier, RateLimitKey, RateLimitResult, RequestCost};
