//! guildcfg Core - Entity Types
//!
//! Pure data structures shared by the storage, engine and API crates.
//! This crate performs no I/O: it holds the data model, the error taxonomy,
//! configuration loading, the cache key layout and input validation.

pub mod config;
pub mod constants;
pub mod entities;
pub mod error;
pub mod identity;
pub mod keys;
pub mod validation;

pub use config::{EngineConfig, RateLimitPolicy};
pub use constants::*;
pub use entities::{
    AuditAction, AuditLogEntry, CachedConfig, ConfigChangeEvent, ConfigDiff, ConfigSnapshot,
    GuildConfig,
};
pub use error::{
    CacheError, ConfigError, GuildCfgError, GuildCfgResult, StorageError, ValidationError,
};
pub use identity::{ActorId, TenantId};
pub use keys::CacheKey;
pub use validation::{ConfigUpdate, ValidatedUpdate};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Durable record version. Starts at 1 and grows by exactly one per commit.
pub type Version = i64;
