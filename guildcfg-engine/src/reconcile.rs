//! Reconciliation between the durable store and the cache mirror.
//!
//! Three entry points:
//!
//! - [`Reconciler::full_reseed`]: wipe the `config:` namespace, write the
//!   schema marker and repopulate every durable row.
//! - [`Reconciler::partial_reconcile`]: repopulate only the durable tenants
//!   whose cache entry is missing. Cost is O(divergence) cache writes.
//! - [`Reconciler::reconcile_active`]: for an externally supplied set of
//!   active tenants, repair missing or stale entries, creating default
//!   durable rows where none exist.
//!
//! Per-tenant failures are counted and logged; they never abort the
//! remaining tenants. Failures reading the marker, clearing the namespace or
//! listing durable rows abort the run.

use std::fmt;
use std::sync::Arc;

use guildcfg_core::{
    ActorId, CacheError, CachedConfig, GuildCfgResult, GuildConfig, TenantId,
    CONFIG_SCHEMA_VERSION,
};
use guildcfg_storage::{CacheRepo, DurableRepo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    FullReseed,
    Partial,
    Periodic,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileMode::FullReseed => "full_reseed",
            ReconcileMode::Partial => "partial",
            ReconcileMode::Periodic => "periodic",
        })
    }
}

/// Summary of one reconcile run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    /// Tenants examined.
    pub scanned: u64,
    /// Cache entries written from an existing durable row.
    pub repaired: u64,
    /// Default durable rows created (and mirrored).
    pub created: u64,
    /// Tenants whose repair failed; retried on the next run.
    pub failed: u64,
}

impl ReconcileReport {
    fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            scanned: 0,
            repaired: 0,
            created: 0,
            failed: 0,
        }
    }

    fn log(&self) {
        tracing::info!(
            mode = %self.mode,
            scanned = self.scanned,
            repaired = self.repaired,
            created = self.created,
            failed = self.failed,
            "Reconcile finished"
        );
    }
}

/// What a cache entry looks like relative to the durable row.
enum EntryState {
    Missing,
    Current,
    Stale,
}

pub struct Reconciler {
    durable: Arc<dyn DurableRepo>,
    cache: Arc<dyn CacheRepo>,
}

impl Reconciler {
    pub fn new(durable: Arc<dyn DurableRepo>, cache: Arc<dyn CacheRepo>) -> Self {
        Self { durable, cache }
    }

    /// Pick the startup mode from the stored schema marker.
    pub async fn startup(&self) -> GuildCfgResult<ReconcileReport> {
        match self.cache.schema_version().await? {
            Some(version) if version == CONFIG_SCHEMA_VERSION => self.partial_reconcile().await,
            stored => {
                tracing::info!(
                    stored = ?stored,
                    expected = CONFIG_SCHEMA_VERSION,
                    "Cache schema marker mismatch, reseeding"
                );
                self.full_reseed().await
            }
        }
    }

    pub async fn full_reseed(&self) -> GuildCfgResult<ReconcileReport> {
        let mut report = ReconcileReport::new(ReconcileMode::FullReseed);

        let cleared = self.cache.clear_namespace().await?;
        self.cache.set_schema_version(CONFIG_SCHEMA_VERSION).await?;
        tracing::debug!(cleared, "Cleared configuration namespace");

        for config in self.durable.list_configs().await? {
            report.scanned += 1;
            match self.cache.write(&CachedConfig::from(&config)).await {
                Ok(()) => report.repaired += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(tenant_id = %config.tenant_id, error = %e, "Reseed failed for tenant");
                }
            }
        }

        report.log();
        Ok(report)
    }

    pub async fn partial_reconcile(&self) -> GuildCfgResult<ReconcileReport> {
        let mut report = ReconcileReport::new(ReconcileMode::Partial);

        for tenant_id in self.durable.list_tenant_ids().await? {
            report.scanned += 1;
            match self.cache.exists(&tenant_id).await {
                Ok(true) => {}
                Ok(false) => match self.repopulate(&tenant_id).await {
                    Ok(true) => report.repaired += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(tenant_id = %tenant_id, error = %e, "Repopulation failed");
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(tenant_id = %tenant_id, error = %e, "Cache probe failed");
                }
            }
        }

        report.log();
        Ok(report)
    }

    /// Bring every tenant in `tenants` to a cache entry that mirrors its
    /// durable row. Idempotent once converged.
    pub async fn reconcile_active(&self, tenants: &[TenantId]) -> GuildCfgResult<ReconcileReport> {
        let mut report = ReconcileReport::new(ReconcileMode::Periodic);

        for tenant_id in tenants {
            report.scanned += 1;
            if let Err(e) = self.reconcile_one(tenant_id, &mut report).await {
                report.failed += 1;
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Reconcile failed for tenant");
            }
        }

        report.log();
        Ok(report)
    }

    /// Write the schema marker if the cache lost it, repopulating every
    /// durable tenant first. Returns `None` when the marker was present.
    pub async fn restore_lost_marker(&self) -> GuildCfgResult<Option<ReconcileReport>> {
        if self.cache.schema_version().await?.is_some() {
            return Ok(None);
        }
        tracing::warn!("Cache schema marker missing, cache data was likely lost");
        let report = self.partial_reconcile().await?;
        self.cache.set_schema_version(CONFIG_SCHEMA_VERSION).await?;
        Ok(Some(report))
    }

    async fn reconcile_one(
        &self,
        tenant_id: &TenantId,
        report: &mut ReconcileReport,
    ) -> GuildCfgResult<()> {
        let durable = match self.durable.get(tenant_id).await? {
            Some(config) => config,
            None => {
                let config = self
                    .durable
                    .create_default(tenant_id, &ActorId::system())
                    .await?;
                self.cache.write(&CachedConfig::from(&config)).await?;
                report.created += 1;
                tracing::info!(tenant_id = %tenant_id, "Created default configuration for active tenant");
                return Ok(());
            }
        };

        match self.entry_state(&durable).await? {
            EntryState::Current => {}
            EntryState::Missing | EntryState::Stale => {
                self.cache.write(&CachedConfig::from(&durable)).await?;
                report.repaired += 1;
            }
        }
        Ok(())
    }

    async fn entry_state(&self, durable: &GuildConfig) -> GuildCfgResult<EntryState> {
        match self.cache.read(&durable.tenant_id).await {
            Ok(None) => Ok(EntryState::Missing),
            Ok(Some(cached)) if cached.mirrors(durable) => Ok(EntryState::Current),
            Ok(Some(cached)) => {
                tracing::debug!(
                    tenant_id = %durable.tenant_id,
                    cached_version = cached.version,
                    durable_version = durable.version,
                    "Stale cache entry"
                );
                Ok(EntryState::Stale)
            }
            // An unreadable entry is overwritten like a stale one.
            Err(CacheError::Serialization { .. }) => Ok(EntryState::Stale),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the durable row to the cache. Returns false when the tenant has
    /// no durable row any more.
    async fn repopulate(&self, tenant_id: &TenantId) -> GuildCfgResult<bool> {
        match self.durable.get(tenant_id).await? {
            Some(config) => {
                self.cache.write(&CachedConfig::from(&config)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
