//! Per-user submission throttling.
//!
//! Each user has a counter in the shared [`CounterStore`] keyed by
//! `key_prefix + user_id`. The first increment in a window arms a TTL of
//! `window_secs`; the counter disappears when the TTL lapses, which starts a
//! fresh window. Every attempt is counted, including denied ones, so a user
//! hammering the endpoint stays throttled until the window ends.
//!
//! Atomicity across concurrent callers is delegated to the store's
//! increment, so any number of coordinator tasks may share one limiter.

use std::sync::Arc;

use crowdwatch_core::constants::{
    RATE_LIMIT_KEY_PREFIX, RATE_LIMIT_REPORTS_PER_MIN, RATE_LIMIT_WINDOW_SECS,
};
use crowdwatch_core::error::{ConfigError, StoreError};
use crowdwatch_core::traits::CounterStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables for [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts allowed per window.
    pub max_per_window: u32,
    pub window_secs: u64,
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: RATE_LIMIT_REPORTS_PER_MIN,
            window_secs: RATE_LIMIT_WINDOW_SECS,
            key_prefix: RATE_LIMIT_KEY_PREFIX.to_string(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window_secs",
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Fixed-window submission counter backed by a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one attempt by `user` and report whether it is within the limit.
    ///
    /// Returns `true` iff the post-increment count is at most
    /// `max_per_window`.
    pub async fn allow(&self, user: &str) -> Result<bool, StoreError> {
        let key = format!("{}{}", self.config.key_prefix, user);
        let count = self.store.incr_with_ttl(&key, self.config.window_secs).await?;
        let ok = count <= u64::from(self.config.max_per_window);
        if !ok {
            debug!(
                user,
                count,
                limit = self.config.max_per_window,
                "rate_limiter: submission limit exceeded"
            );
        }
        Ok(ok)
    }
}
