//! Durable store traits.

use async_trait::async_trait;
use guildcfg_core::{
    ActorId, AuditLogEntry, GuildConfig, StorageError, TenantId, Timestamp, ValidatedUpdate,
    Version,
};

pub type StorageResult<T> = Result<T, StorageError>;

/// Transactional, versioned store of per-tenant configuration.
///
/// This is the source of truth. Every mutation appends exactly one audit
/// entry in the same transaction.
#[async_trait]
pub trait DurableRepo: Send + Sync {
    /// Fetch the configuration for a tenant, `None` when it has none yet.
    async fn get(&self, tenant_id: &TenantId) -> StorageResult<Option<GuildConfig>>;

    /// Create the default row for a tenant.
    ///
    /// Idempotent: when a concurrent creation already committed, the existing
    /// row is returned instead of an error.
    async fn create_default(
        &self,
        tenant_id: &TenantId,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig>;

    /// Replace the settings of a tenant if its stored version equals
    /// `expected_version`.
    ///
    /// On success the version is incremented by exactly one, the whitelist is
    /// deleted and reinserted, and an `update` audit entry is appended, all in
    /// one transaction. On mismatch nothing is written and
    /// [`StorageError::VersionConflict`] carries the current version.
    async fn update(
        &self,
        tenant_id: &TenantId,
        expected_version: Version,
        update: &ValidatedUpdate,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig>;

    /// Every configuration row, whitelist included.
    async fn list_configs(&self) -> StorageResult<Vec<GuildConfig>>;

    /// Tenant ids known to the store.
    async fn list_tenant_ids(&self) -> StorageResult<Vec<TenantId>>;
}

/// Read and retention access to the audit log.
///
/// There is no `append`: entries are only written from inside
/// [`DurableRepo`] transactions.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Entries for one tenant, oldest first.
    async fn entries_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<AuditLogEntry>>;

    /// Delete entries created strictly before `cutoff`. Returns the number
    /// of deleted entries.
    async fn prune_before(&self, cutoff: Timestamp) -> StorageResult<u64>;
}
