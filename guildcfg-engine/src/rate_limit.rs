//! Sliding-window rate limiter.
//!
//! The check-count-record step runs atomically inside the backing
//! [`SlidingWindowStore`]. When the store cannot be reached the limiter
//! fails open: the request is allowed and the outcome is marked degraded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use guildcfg_core::{ActorId, GuildCfgError, GuildCfgResult, RateLimitPolicy};
use guildcfg_storage::SlidingWindowStore;

/// Result of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest request in the window expires.
    pub reset_at: DateTime<Utc>,
    /// The backing store was unreachable and the request was let through.
    pub degraded: bool,
}

impl RateLimitOutcome {
    /// Whole seconds until `reset_at`, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Window identifier for configuration writes by `actor`.
pub fn write_key(actor: &ActorId) -> String {
    format!("user:{}:config:write", actor)
}

/// Window identifier for configuration reads by `actor`.
pub fn read_key(actor: &ActorId) -> String {
    format!("user:{}:config:read", actor)
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SlidingWindowStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SlidingWindowStore>) -> Self {
        Self { store }
    }

    pub async fn check_at(
        &self,
        identifier: &str,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitOutcome {
        let now_ms = now.timestamp_millis();
        let window_ms = policy.window_ms();

        match self
            .store
            .hit(identifier, now_ms, window_ms, policy.limit)
            .await
        {
            Ok(decision) => RateLimitOutcome {
                allowed: decision.allowed,
                limit: policy.limit,
                remaining: policy.limit.saturating_sub(decision.count),
                reset_at: DateTime::from_timestamp_millis(decision.reset_at_ms)
                    .unwrap_or(now),
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(
                    identifier,
                    error = %e,
                    "Rate limit store unavailable, allowing request"
                );
                RateLimitOutcome {
                    allowed: true,
                    limit: policy.limit,
                    remaining: policy.limit,
                    reset_at: now + chrono::Duration::milliseconds(window_ms),
                    degraded: true,
                }
            }
        }
    }

    /// Like [`RateLimiter::check_at`], but a rejection becomes
    /// [`GuildCfgError::RateLimited`].
    pub async fn enforce_at(
        &self,
        identifier: &str,
        policy: RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> GuildCfgResult<RateLimitOutcome> {
        let outcome = self.check_at(identifier, policy, now).await;
        if outcome.allowed {
            return Ok(outcome);
        }
        let retry_after_secs = outcome.retry_after_secs(now);
        tracing::info!(identifier, retry_after_secs, "Rate limit exceeded");
        Err(GuildCfgError::RateLimited {
            identifier: identifier.to_string(),
            reset_at: outcome.reset_at,
            retry_after_secs,
        })
    }

    pub async fn enforce(
        &self,
        identifier: &str,
        policy: RateLimitPolicy,
    ) -> GuildCfgResult<RateLimitOutcome> {
        self.enforce_at(identifier, policy, Utc::now()).await
    }

    /// Delete windows that have fully expired at `now`.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> GuildCfgResult<u64> {
        let purged = self.store.purge_expired(now.timestamp_millis()).await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired rate limit windows");
        }
        Ok(purged)
    }
}
