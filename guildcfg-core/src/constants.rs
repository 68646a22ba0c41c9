//! Constants for guildcfg
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// DATA MODEL
// ============================================================================

/// Maximum number of channel ids a whitelist submission may carry.
pub const MAX_WHITELIST_SIZE: usize = 500;

/// Version assigned to a freshly created configuration row.
pub const INITIAL_VERSION: i64 = 1;

/// Identifier of the actor used for writes performed by the engine itself.
pub const SYSTEM_ACTOR: &str = "system";

/// Cache data-layout version compiled into this build.
///
/// Bump whenever the JSON shape stored under `config:{tenantId}` changes;
/// a mismatch with the stored marker triggers a full reseed on startup.
pub const CONFIG_SCHEMA_VERSION: i64 = 1;

// ============================================================================
// CACHE KEY LAYOUT
// ============================================================================

/// Namespace prefix shared by every configuration cache key.
pub const CONFIG_NAMESPACE: &str = "config:";

/// Suffix of the schema marker key inside the configuration namespace.
pub const SCHEMA_VERSION_SUFFIX: &str = "schema_version";

/// Namespace prefix for rate-limit windows.
pub const RATE_LIMIT_NAMESPACE: &str = "ratelimit:";

/// Channel name for change notifications.
pub const CONFIG_UPDATE_CHANNEL: &str = "config:update";

// ============================================================================
// BACKGROUND JOBS
// ============================================================================

/// Default interval between periodic reconcile runs (10 minutes).
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 600;

/// Default audit log retention horizon in days.
pub const DEFAULT_AUDIT_RETENTION_DAYS: u32 = 90;

/// Default local hour of day at which the retention job runs.
pub const DEFAULT_RETENTION_RUN_HOUR: u32 = 2;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Default number of configuration writes allowed per window.
pub const DEFAULT_WRITE_RATE_LIMIT: u32 = 5;

/// Default write window in seconds.
pub const DEFAULT_WRITE_RATE_WINDOW_SECS: u64 = 60;

/// Default number of configuration reads allowed per window.
pub const DEFAULT_READ_RATE_LIMIT: u32 = 10;

/// Default read window in seconds.
pub const DEFAULT_READ_RATE_WINDOW_SECS: u64 = 10;
