//! Sliding Window Rate Limiter
//!
//! Two adjacent fixed windows (current and previous) give a weighted count
//! based on how far into the current window we are. No bursts are allowed,
//! which suits credential endpoints and per-user community actions.

use super::storage::RateLimitStorage;
use super::types::{AuthEndpoint, RateLimitKey, SlidingWindowState, current_time_secs};
use crate::config::{ActionLimitConfig, AuthProtectionConfig};
use crate::domain::community::value_objects::CommunityAction;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const MINUTE: u64 = 60;
const HOUR: u64 = 3600;

/// Result of a credential endpoint check
#[derive(Debug, Clone)]
pub struct AuthRateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix timestamp when the lockout expires (if blocked)
    pub lockout_until: Option<u64>,
    pub endpoint: AuthEndpoint,
}

impl AuthRateLimitResult {
    pub fn allowed(remaining: u32, endpoint: AuthEndpoint) -> Self {
        Self {
            allowed: true,
            remaining,
            lockout_until: None,
            endpoint,
        }
    }

    pub fn blocked(lockout_until: u64, endpoint: AuthEndpoint) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            lockout_until: Some(lockout_until),
            endpoint,
        }
    }

    pub fn retry_after(&self) -> u64 {
        self.lockout_until
            .map(|until| until.saturating_sub(current_time_secs()).max(1))
            .unwrap_or(0)
    }
}

/// Result of a community action check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionLimitResult {
    Allowed { remaining: u32 },
    Blocked { retry_after: u64 },
}

pub struct SlidingWindowLimiter {
    storage: Arc<dyn RateLimitStorage>,
    key_prefix: String,
}

impl SlidingWindowLimiter {
    pub fn new(storage: Arc<dyn RateLimitStorage>, key_prefix: &str) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn auth_key(&self, ip: &str, endpoint: AuthEndpoint) -> String {
        let base_key = RateLimitKey::AuthIp(ip.to_string()).to_redis_key(&self.key_prefix);
        format!("{}:{}", base_key, endpoint.as_str())
    }

    /// Check and count a credential endpoint request; overflowing either
    /// window locks the IP out for `lockout_duration_minutes`
    pub async fn check(
        &self,
        ip: &str,
        endpoint: AuthEndpoint,
        config: &AuthProtectionConfig,
    ) -> AuthRateLimitResult {
        if !config.enabled {
            return AuthRateLimitResult::allowed(u32::MAX, endpoint);
        }

        let redis_key = self.auth_key(ip, endpoint);

        if let Ok(Some(lockout_until)) = self.storage.get_lockout(&redis_key).await
            && current_time_secs() < lockout_until
        {
            debug!(ip = %ip, endpoint = %endpoint.as_str(), lockout_until, "Auth request blocked by lockout");
            return AuthRateLimitResult::blocked(lockout_until, endpoint);
        }

        let (limit_per_minute, limit_per_hour) = match endpoint {
            AuthEndpoint::Login => (
                config.login_attempts_per_minute,
                config.login_attempts_per_hour,
            ),
            AuthEndpoint::Register => (
                config.register_attempts_per_minute,
                config.register_attempts_per_hour,
            ),
        };

        match self
            .check_and_count(&redis_key, limit_per_minute, limit_per_hour)
            .await
        {
            Ok(remaining) => {
                debug!(ip = %ip, endpoint = %endpoint.as_str(), remaining, "Auth rate limit check passed");
                AuthRateLimitResult::allowed(remaining, endpoint)
            }
            Err(_) => {
                let lockout_secs = config.lockout_duration_minutes as u64 * 60;
                let lockout_until = current_time_secs() + lockout_secs;
                if let Err(e) = self
                    .storage
                    .set_lockout(&redis_key, lockout_until, lockout_secs)
                    .await
                {
                    warn!("Failed to set lockout: {}", e);
                }
                warn!(ip = %ip, endpoint = %endpoint.as_str(), lockout_until, "Auth rate limit exceeded, applying lockout");
                AuthRateLimitResult::blocked(lockout_until, endpoint)
            }
        }
    }

    /// Check and count one community action for a user.
    ///
    /// `bonus_percent` raises both windows' limits.
    pub async fn check_action(
        &self,
        user_id: Uuid,
        action: CommunityAction,
        limits: &ActionLimitConfig,
        bonus_percent: u8,
    ) -> ActionLimitResult {
        let redis_key = RateLimitKey::Action(user_id, action).to_redis_key(&self.key_prefix);
        let per_minute = apply_bonus(limits.per_minute, bonus_percent);
        let per_hour = apply_bonus(limits.per_hour, bonus_percent);

        match self.check_and_count(&redis_key, per_minute, per_hour).await {
            Ok(remaining) => ActionLimitResult::Allowed { remaining },
            Err(window_size) => {
                let now = current_time_secs();
                let retry_after = (window_size - now % window_size).max(1);
                debug!(user_id = %user_id, action = %action, retry_after, "Action rate limit exceeded");
                ActionLimitResult::Blocked { retry_after }
            }
        }
    }

    /// Counts against both windows when both have room. Returns the remaining
    /// budget, or the size of the window that overflowed.
    async fn check_and_count(
        &self,
        redis_key: &str,
        limit_per_minute: u32,
        limit_per_hour: u32,
    ) -> Result<u32, u64> {
        let minute_key = format!("{}:min", redis_key);
        let hour_key = format!("{}:hr", redis_key);

        let (minute_ok, minute_remaining) =
            self.check_window(&minute_key, limit_per_minute, MINUTE).await;
        if !minute_ok {
            return Err(MINUTE);
        }
        let (hour_ok, hour_remaining) = self.check_window(&hour_key, limit_per_hour, HOUR).await;
        if !hour_ok {
            return Err(HOUR);
        }

        if let Err(e) = self.increment_window(&minute_key, MINUTE).await {
            warn!("Failed to increment minute counter: {}", e);
        }
        if let Err(e) = self.increment_window(&hour_key, HOUR).await {
            warn!("Failed to increment hour counter: {}", e);
        }

        Ok(minute_remaining
            .min(hour_remaining)
            .saturating_sub(1))
    }

    /// Returns (allowed, remaining) without counting
    async fn check_window(&self, key: &str, limit: u32, window_size: u64) -> (bool, u32) {
        let state = match self.storage.get_sliding_window(key).await {
            Ok(Some(state)) => state,
            Ok(None) => return (limit > 0, limit),
            Err(e) => {
                warn!("Failed to get sliding window state: {}", e);
                return (true, limit);
            }
        };

        let now = current_time_secs();
        let window_start = now - (now % window_size);
        let elapsed_ratio = (now % window_size) as f64 / window_size as f64;

        let count = if state.window_start == window_start {
            state.current_count as f64 + state.previous_count as f64 * (1.0 - elapsed_ratio)
        } else if state.window_start + window_size == window_start {
            state.current_count as f64 * (1.0 - elapsed_ratio)
        } else {
            0.0
        };

        let count_rounded = count.ceil() as u32;
        (count_rounded < limit, limit.saturating_sub(count_rounded))
    }

    async fn increment_window(&self, key: &str, window_size: u64) -> Result<(), String> {
        let now = current_time_secs();
        let window_start = now - (now % window_size);

        let mut state = self
            .storage
            .get_sliding_window(key)
            .await?
            .unwrap_or_default();

        if state.window_start == window_start {
            state.current_count += 1;
        } else if state.window_start + window_size == window_start {
            state.previous_count = state.current_count;
            state.current_count = 1;
            state.window_start = window_start;
        } else {
            state = SlidingWindowState {
                current_count: 1,
                previous_count: 0,
                window_start,
            };
        }

        self.storage
            .set_sliding_window(key, &state, window_size * 2)
            .await
    }
}

fn apply_bonus(base: u32, bonus_percent: u8) -> u32 {
    let bonus = (base as u64 * bonus_percent as u64) / 100;
    (base as u64 + bonus).min(u32::MAX as u64) as u32
}
