//! Token Bucket Rate Limiter
//!
//! Tokens refill at `requests_per_minute` and the bucket holds up to
//! `requests_per_minute + burst_size`. Each request spends its cost in tokens.

use super::storage::RateLimitStorage;
use super::types::{AuthTier, RateLimitKey, RateLimitResult, TokenBucketState, current_time_millis};
use crate::config::TierLimitConfig;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket state outlives a full refill so idle keys expire
const STATE_TTL_SECS: u64 = 120;

pub struct TokenBucket {
    storage: Arc<dyn RateLimitStorage>,
    key_prefix: String,
}

impl TokenBucket {
    pub fn new(storage: Arc<dyn RateLimitStorage>, key_prefix: &str) -> Self {
        Self {
            storage,
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Consume `cost` tokens if available.
    ///
    /// Storage failures fail open: the request is allowed and a warning logged.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        tier: AuthTier,
        config: &TierLimitConfig,
        cost: u32,
    ) -> RateLimitResult {
        let redis_key = key.to_redis_key(&self.key_prefix);
        let limit = config.requests_per_minute;
        let max_tokens = limit.saturating_add(config.burst_size);
        let refill_rate = limit as f64 / 60_000.0; // per millisecond

        let mut state = match self.storage.get_token_bucket(&redis_key).await {
            Ok(Some(state)) => state,
            Ok(None) => TokenBucketState::new(max_tokens),
            Err(e) => {
                warn!("Failed to get token bucket state, allowing request: {}", e);
                return RateLimitResult::allowed(limit, limit, calculate_reset_time(), tier);
            }
        };

        let now = current_time_millis();
        let elapsed_ms = now.saturating_sub(state.last_refill);
        state.tokens = (state.tokens + elapsed_ms as f64 * refill_rate).min(max_tokens as f64);
        state.last_refill = now;

        let cost_f64 = cost as f64;
        let result = if state.tokens >= cost_f64 {
            state.tokens -= cost_f64;
            let remaining = state.tokens.floor() as u32;
            debug!(key = %redis_key, tier = %tier, remaining, limit, "Rate limit check passed");
            RateLimitResult::allowed(limit, remaining, calculate_reset_time(), tier)
        } else {
            let tokens_needed = cost_f64 - state.tokens;
            let wait_ms = if refill_rate > 0.0 {
                (tokens_needed / refill_rate).ceil() as u64
            } else {
                60_000
            };
            let retry_after_secs = wait_ms.div_ceil(1000).max(1);
            debug!(key = %redis_key, tier = %tier, retry_after = retry_after_secs, "Rate limit exceeded");
            RateLimitResult::blocked(limit, calculate_reset_time(), retry_after_secs, tier)
        };

        if let Err(e) = self
            .storage
            .set_token_bucket(&redis_key, &state, STATE_TTL_SECS)
            .await
        {
            warn!("Failed to save token bucket state: {}", e);
        }

        result
    }
}

/// End of the current minute
fn calculate_reset_time() -> u64 {
    let now = super::types::current_time_secs();
    (now / 60 + 1) * 60
}
