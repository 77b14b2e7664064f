//! Rate limiter types and core data structures

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::RequestCostsConfig;
use crate::domain::community::value_objects::CommunityAction;

/// Which token bucket applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthTier {
    /// Valid bearer token, keyed by user id
    Authenticated,
    /// Everyone else, keyed by client IP
    Anonymous,
}

impl AuthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthTier::Authenticated => "authenticated",
            AuthTier::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for AuthTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one rate limit state entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    Ip(String),
    UserId(Uuid),
    /// Credential endpoints, per IP
    AuthIp(String),
    /// Community action, per user
    Action(Uuid, CommunityAction),
}

impl RateLimitKey {
    pub fn to_redis_key(&self, prefix: &str) -> String {
        match self {
            RateLimitKey::Ip(ip) => format!("{}:ip:{}", prefix, ip),
            RateLimitKey::UserId(id) => format!("{}:user:{}", prefix, id),
            RateLimitKey::AuthIp(ip) => format!("{}:auth:{}", prefix, ip),
            RateLimitKey::Action(id, action) => {
                format!("{}:action:{}:{}", prefix, action.as_str(), id)
            }
        }
    }
}

/// Result of a token bucket check
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp when the rate limit resets
    pub reset_at: u64,
    /// Only set when blocked
    pub retry_after: Option<u64>,
    pub tier: AuthTier,
}

impl RateLimitResult {
    pub fn allowed(limit: u32, remaining: u32, reset_at: u64, tier: AuthTier) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
            retry_after: None,
            tier,
        }
    }

    pub fn blocked(limit: u32, reset_at: u64, retry_after: u64, tier: AuthTier) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after),
            tier,
        }
    }
}

/// Token bucket state for a single key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketState {
    pub tokens: f64,
    /// Unix timestamp in milliseconds
    pub last_refill: u64,
}

impl TokenBucketState {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            tokens: max_tokens as f64,
            last_refill: current_time_millis(),
        }
    }
}

/// Sliding window counter state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowState {
    pub current_count: u32,
    pub previous_count: u32,
    /// Unix timestamp in seconds
    pub window_start: u64,
}

impl SlidingWindowState {
    pub fn new() -> Self {
        Self {
            current_count: 0,
            previous_count: 0,
            window_start: current_time_secs(),
        }
    }
}

impl Default for SlidingWindowState {
    fn default() -> Self {
        Self::new()
    }
}

/// Request cost weights
#[derive(Debug, Clone, Copy)]
pub enum RequestCost {
    Get,
    /// POST/PUT/PATCH/DELETE
    Write,
}

impl RequestCost {
    pub fn from_method(method: &str) -> Self {
        match method {
            "GET" | "HEAD" | "OPTIONS" => RequestCost::Get,
            _ => RequestCost::Write,
        }
    }

    pub fn value(&self, config: &RequestCostsConfig) -> u32 {
        match self {
            RequestCost::Get => config.get,
            RequestCost::Write => config.write,
        }
    }
}

/// Credential endpoints guarded by the sliding window limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEndpoint {
    Login,
    Register,
}

impl AuthEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEndpoint::Login => "login",
            AuthEndpoint::Register => "register",
        }
    }
}

pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
