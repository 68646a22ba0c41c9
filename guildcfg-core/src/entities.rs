//! Entity types: the durable configuration row, audit entries, and the
//! wire shapes mirrored into the cache.

use serde::{Deserialize, Serialize};

use crate::constants::INITIAL_VERSION;
use crate::identity::{ActorId, TenantId};
use crate::validation::ValidatedUpdate;
use crate::{Timestamp, Version};

// ============================================================================
// DURABLE RECORDS
// ============================================================================

/// Per-tenant configuration as held by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub tenant_id: TenantId,
    pub allow_all_channels: bool,
    /// Channel ids; only meaningful when `allow_all_channels` is false.
    pub whitelist: Vec<String>,
    pub version: Version,
    pub updated_at: Timestamp,
    pub updated_by: ActorId,
}

impl GuildConfig {
    /// The row created lazily for a tenant seen for the first time.
    pub fn default_for(tenant_id: TenantId, actor: ActorId, now: Timestamp) -> Self {
        Self {
            tenant_id,
            allow_all_channels: true,
            whitelist: Vec::new(),
            version: INITIAL_VERSION,
            updated_at: now,
            updated_by: actor,
        }
    }

    /// Build the successor of this row after applying `update`.
    pub fn next(&self, update: &ValidatedUpdate, actor: ActorId, now: Timestamp) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            allow_all_channels: update.allow_all_channels(),
            whitelist: update.whitelist().to_vec(),
            version: self.version + 1,
            updated_at: now,
            updated_by: actor,
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            allow_all_channels: self.allow_all_channels,
            whitelisted_channel_ids: self.whitelist.clone(),
        }
    }
}

/// Kind of change recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(AuditAction::Create),
            "update" => Some(AuditAction::Update),
            _ => None,
        }
    }
}

/// The settings part of a configuration, as recorded in audit diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub allow_all_channels: bool,
    pub whitelisted_channel_ids: Vec<String>,
}

/// Serialized change stored with each audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDiff {
    /// Absent for `create` entries.
    pub previous: Option<ConfigSnapshot>,
    pub current: ConfigSnapshot,
}

impl ConfigDiff {
    pub fn created(config: &GuildConfig) -> Self {
        Self {
            previous: None,
            current: config.snapshot(),
        }
    }

    pub fn updated(before: &GuildConfig, after: &GuildConfig) -> Self {
        Self {
            previous: Some(before.snapshot()),
            current: after.snapshot(),
        }
    }
}

/// One append-only audit record, written in the same transaction as the
/// configuration change it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub action: AuditAction,
    pub old_version: Option<Version>,
    pub new_version: Version,
    pub changes: ConfigDiff,
    pub created_at: Timestamp,
}

// ============================================================================
// CACHE SHAPES
// ============================================================================

/// Denormalized snapshot stored under `config:{tenantId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedConfig {
    pub tenant_id: TenantId,
    pub allow_all_channels: bool,
    pub whitelist: Vec<String>,
    pub version: Version,
    pub updated_at: Timestamp,
}

impl From<&GuildConfig> for CachedConfig {
    fn from(config: &GuildConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            allow_all_channels: config.allow_all_channels,
            whitelist: config.whitelist.clone(),
            version: config.version,
            updated_at: config.updated_at,
        }
    }
}

impl CachedConfig {
    /// True when this entry faithfully mirrors `durable`.
    pub fn mirrors(&self, durable: &GuildConfig) -> bool {
        *self == CachedConfig::from(durable)
    }
}

/// Payload published on `config:update` after a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeEvent {
    pub tenant_id: TenantId,
    pub version: Version,
    pub updated_at: Timestamp,
}

impl From<&GuildConfig> for ConfigChangeEvent {
    fn from(config: &GuildConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            version: config.version,
            updated_at: config.updated_at,
        }
    }
}
