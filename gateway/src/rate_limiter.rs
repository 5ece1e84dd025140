//! Per-model token-bucket rate limiting.
//! `rate = min(maxRPM, maxTPM/avgTokensPerRequest) / 60` per second,
//! `burst = 10%` of rate. `wait` blocks until a token is available or the
//! scope cancels; `allow` is non-blocking.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use forge_core::{CancelScope, ModelConfig};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::GatewayError;

/// Assumed average tokens consumed per request when deriving a rate from
/// `maxTPM`; callers with a different profile should tune `maxRPM`/`maxTPM`
/// directly rather than relying on this constant.
const AVG_TOKENS_PER_REQUEST: f64 = 500.0;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate_per_sec: f64,
    capacity: f64,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, capacity: f64) -> Self {
        TokenBucket {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            rate_per_sec,
            capacity,
        }
    }

    pub fn from_model_config(cfg: &ModelConfig) -> Self {
        let by_rpm = cfg.max_rpm;
        let by_tpm = if cfg.max_tpm > 0.0 {
            cfg.max_tpm / AVG_TOKENS_PER_REQUEST
        } else {
            f64::INFINITY
        };
        let rate_per_min = by_rpm.min(by_tpm);
        let rate_per_sec = (rate_per_min / 60.0).max(0.001);
        let capacity = (rate_per_sec * 0.1).max(1.0);
        TokenBucket::new(rate_per_sec, capacity)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Non-blocking: consumes a token and returns `true` if one was
    /// available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks until a token is available or `scope` cancels.
    pub async fn wait(&self, scope: &CancelScope) -> Result<(), GatewayError> {
        loop {
            if self.allow() {
                return Ok(());
            }
            if scope.is_cancelled() {
                return Err(GatewayError::RateLimitCancelled);
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(15)) => {}
                _ = scope.cancelled() => return Err(GatewayError::RateLimitCancelled),
            }
        }
    }
}

/// `get-or-create` registry of per-model buckets, synchronized via
/// `DashMap`; each resulting bucket is itself internally synchronized.
#[derive(Default)]
pub struct RateLimiterRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, cfg: &ModelConfig) -> Arc<TokenBucket> {
        self.buckets
            .entry(cfg.id.clone())
            .or_insert_with(|| Arc::new(TokenBucket::from_model_config(cfg)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_tokens_are_admitted_immediately() {
        let bucket = TokenBucket::new(1.0, 3.0);
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[tokio::test]
    async fn wait_returns_once_a_token_refills() {
        let bucket = TokenBucket::new(100.0, 1.0);
        assert!(bucket.allow());
        let scope = CancelScope::with_timeout(Duration::from_secs(1));
        bucket.wait(&scope).await.unwrap();
    }

    #[tokio::test]
    async fn wait_is_cancelled_by_an_expired_scope() {
        let bucket = TokenBucket::new(0.001, 1.0);
        assert!(bucket.allow());
        let scope = CancelScope::with_timeout(Duration::from_millis(20));
        let err = bucket.wait(&scope).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitCancelled));
    }

    #[test]
    fn admitted_requests_over_window_respect_rate_plus_burst() {
        let bucket = TokenBucket::new(10.0, 2.0);
        let mut admitted = 0;
        for _ in 0..2 {
            if bucket.allow() {
                admitted += 1;
            }
        }
        assert!(admitted as f64 <= 2.0);
    }
}
