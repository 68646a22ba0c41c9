//! Cache mirror trait.

use async_trait::async_trait;
use guildcfg_core::{CacheError, CachedConfig, ConfigChangeEvent, TenantId};
use tokio::sync::broadcast;

pub type CacheResult<T> = Result<T, CacheError>;

/// Read-optimized mirror of the durable store plus the `config:update`
/// change notification channel.
///
/// Entries have no TTL; they persist until replaced. Writes are
/// unconditional, so ordering between racing writers is repaired by
/// reconciliation rather than enforced here.
#[async_trait]
pub trait CacheRepo: Send + Sync {
    /// Store the snapshot under `config:{tenantId}`.
    async fn write(&self, config: &CachedConfig) -> CacheResult<()>;

    async fn read(&self, tenant_id: &TenantId) -> CacheResult<Option<CachedConfig>>;

    async fn exists(&self, tenant_id: &TenantId) -> CacheResult<bool>;

    /// Publish a change event. Fire-and-forget: having no subscribers is not
    /// an error.
    async fn notify(&self, event: &ConfigChangeEvent) -> CacheResult<()>;

    /// Subscribe to change events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent>;

    /// The stored schema marker, `None` when absent or unreadable.
    async fn schema_version(&self) -> CacheResult<Option<i64>>;

    async fn set_schema_version(&self, version: i64) -> CacheResult<()>;

    /// Delete every key under `config:`, the schema marker included.
    /// Returns the number of deleted keys.
    async fn clear_namespace(&self) -> CacheResult<u64>;
}
