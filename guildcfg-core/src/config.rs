//! Engine Configuration Module
//!
//! Tunables for the background jobs and the rate limiter. Loaded from
//! environment variables with defaults matching production behavior.

use std::time::Duration;

use crate::constants::{
    DEFAULT_AUDIT_RETENTION_DAYS, DEFAULT_READ_RATE_LIMIT, DEFAULT_READ_RATE_WINDOW_SECS,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RETENTION_RUN_HOUR, DEFAULT_WRITE_RATE_LIMIT,
    DEFAULT_WRITE_RATE_WINDOW_SECS,
};
use crate::error::ConfigError;

// ============================================================================
// RATE LIMIT POLICY
// ============================================================================

/// Limit and window for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Configuration writes: 5 per minute per actor.
    pub fn writes() -> Self {
        Self::new(
            DEFAULT_WRITE_RATE_LIMIT,
            Duration::from_secs(DEFAULT_WRITE_RATE_WINDOW_SECS),
        )
    }

    /// Configuration reads: 10 per 10 seconds per actor.
    pub fn reads() -> Self {
        Self::new(
            DEFAULT_READ_RATE_LIMIT,
            Duration::from_secs(DEFAULT_READ_RATE_WINDOW_SECS),
        )
    }

    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval between periodic reconcile runs.
    pub reconcile_interval: Duration,

    /// Audit entries older than this many days are pruned.
    pub audit_retention_days: u32,

    /// Local hour of day (0-23) at which the retention job runs.
    pub retention_run_hour: u32,

    pub write_rate: RateLimitPolicy,
    pub read_rate: RateLimitPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            audit_retention_days: DEFAULT_AUDIT_RETENTION_DAYS,
            retention_run_hour: DEFAULT_RETENTION_RUN_HOUR,
            write_rate: RateLimitPolicy::writes(),
            read_rate: RateLimitPolicy::reads(),
        }
    }
}

impl EngineConfig {
    /// Create EngineConfig from environment variables.
    ///
    /// Environment variables:
    /// - `GUILDCFG_RECONCILE_INTERVAL_SECS`: Periodic reconcile interval (default: 600)
    /// - `GUILDCFG_AUDIT_RETENTION_DAYS`: Audit retention horizon (default: 90)
    /// - `GUILDCFG_RETENTION_RUN_HOUR`: Local hour for the retention run (default: 2)
    /// - `GUILDCFG_WRITE_RATE_LIMIT` / `GUILDCFG_WRITE_RATE_WINDOW_SECS` (default: 5 / 60)
    /// - `GUILDCFG_READ_RATE_LIMIT` / `GUILDCFG_READ_RATE_WINDOW_SECS` (default: 10 / 10)
    ///
    /// Unparseable values fall back to the default; out-of-range values are
    /// caught by [`EngineConfig::validate`].
    pub fn from_env() -> Self {
        let reconcile_interval_secs = env_or("GUILDCFG_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS);
        let audit_retention_days = env_or("GUILDCFG_AUDIT_RETENTION_DAYS", DEFAULT_AUDIT_RETENTION_DAYS);
        let retention_run_hour = env_or("GUILDCFG_RETENTION_RUN_HOUR", DEFAULT_RETENTION_RUN_HOUR);

        let write_rate = RateLimitPolicy::new(
            env_or("GUILDCFG_WRITE_RATE_LIMIT", DEFAULT_WRITE_RATE_LIMIT),
            Duration::from_secs(env_or(
                "GUILDCFG_WRITE_RATE_WINDOW_SECS",
                DEFAULT_WRITE_RATE_WINDOW_SECS,
            )),
        );
        let read_rate = RateLimitPolicy::new(
            env_or("GUILDCFG_READ_RATE_LIMIT", DEFAULT_READ_RATE_LIMIT),
            Duration::from_secs(env_or(
                "GUILDCFG_READ_RATE_WINDOW_SECS",
                DEFAULT_READ_RATE_WINDOW_SECS,
            )),
        );

        Self {
            reconcile_interval: Duration::from_secs(reconcile_interval_secs),
            audit_retention_days,
            retention_run_hour,
            write_rate,
            read_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "reconcile_interval".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retention_run_hour > 23 {
            return Err(ConfigError::InvalidValue {
                field: "retention_run_hour".to_string(),
                value: self.retention_run_hour.to_string(),
                reason: "must be between 0 and 23".to_string(),
            });
        }
        for (field, policy) in [("write_rate", &self.write_rate), ("read_rate", &self.read_rate)] {
            if policy.limit == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.limit", field),
                    value: "0".to_string(),
                    reason: "must allow at least one request".to_string(),
                });
            }
            if policy.window.as_millis() == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.window", field),
                    value: format!("{:?}", policy.window),
                    reason: "must be at least one millisecond".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
