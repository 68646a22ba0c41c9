//! Error types for guildcfg operations

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Input validation errors. Never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Whitelist holds {submitted} channels, limit is {limit}")]
    WhitelistTooLarge { submitted: usize, limit: usize },
}

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Configuration not found for tenant {tenant_id}")]
    NotFound { tenant_id: String },

    /// The caller's expected version did not match; nothing was written.
    #[error("Version conflict for tenant {tenant_id}: current version is {current_version}")]
    VersionConflict {
        tenant_id: String,
        current_version: i64,
    },

    /// The transaction aborted; no partial state was committed.
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Cache mirror errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Change notification failed: {reason}")]
    NotifyFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all guildcfg errors.
#[derive(Debug, Clone, Error)]
pub enum GuildCfgError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The tenant failed the upstream presence check.
    #[error("Tenant {tenant_id} is not active")]
    TenantNotActive { tenant_id: String },

    #[error("Rate limit exceeded for {identifier}, retry after {retry_after_secs}s")]
    RateLimited {
        identifier: String,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    /// The durable write committed but the cache mirror could not be updated.
    #[error(
        "Version {committed_version} committed for tenant {tenant_id} but cache propagation failed: {reason}"
    )]
    CachePropagation {
        tenant_id: String,
        committed_version: i64,
        reason: String,
    },
}

/// Result type alias for guildcfg operations.
pub type GuildCfgResult<T> = Result<T, GuildCfgError>;

// =============================================================================
// TESTS
// =============================================================================
