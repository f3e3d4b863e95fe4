//! Fixed-window rate limiting.
//!
//! The persisted counter row is the source of truth; window rollover and
//! increment happen in one atomic store call, so concurrent callers
//! sharing a key never both observe a fresh window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::store::EventStore;
use crate::types::RateLimitDecision;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u64,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Gatekeeper in front of ingestion and reads.
pub struct RateLimiter {
    store: Arc<dyn EventStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn EventStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Count this request against the (key, endpoint) window and decide
    /// whether it is allowed.
    ///
    /// The request that pushes the count past the limit is itself
    /// rejected, but still consumes a slot: the counter reflects true
    /// demand and `remaining` never goes negative. Storage errors
    /// propagate untouched; whether to fail open or closed on a limiter
    /// fault is the caller's policy, not ours.
    pub async fn check_and_consume(&self, key: &str, endpoint: &str) -> Result<RateLimitDecision> {
        let now = Utc::now();
        let window = chrono::Duration::milliseconds(self.config.window.as_millis() as i64);

        let counter = self
            .store
            .rate_limit_upsert(key, endpoint, now, window)
            .await
            .map_err(|err| {
                tracing::error!(key, endpoint, error = %err, "rate limit counter update failed");
                err
            })?;

        let max = self.config.max_requests;
        Ok(RateLimitDecision {
            allowed: counter.count <= max,
            limit: max,
            remaining: max.saturating_sub(counter.count),
            reset_at: counter.window_reset_at.timestamp(),
        })
    }

    /// Delete counter rows whose window has passed. Intended to run from
    /// a periodic background sweep.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let removed = self.store.delete_expired_windows(Utc::now()).await?;
        if removed > 0 {
            tracing::debug!(removed, "swept expired rate limit windows");
        }
        Ok(removed)
    }
}
