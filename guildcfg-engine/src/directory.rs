//! Tenant membership capability.
//!
//! Which tenants are currently active (the bot is joined to the guild) is
//! owned by an external collaborator. The engine consumes it through
//! [`TenantDirectory`] and never derives it from the cache it is repairing.

use std::collections::BTreeSet;

use async_trait::async_trait;
use guildcfg_core::{GuildCfgResult, TenantId};
use tokio::sync::RwLock;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Upstream presence check for a single tenant.
    async fn is_active(&self, tenant_id: &TenantId) -> GuildCfgResult<bool>;

    /// Every tenant currently reported as active.
    async fn active_tenants(&self) -> GuildCfgResult<Vec<TenantId>>;
}

/// Directory backed by a fixed set that can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory {
    tenants: RwLock<BTreeSet<TenantId>>,
    admit_unlisted: bool,
}

impl StaticTenantDirectory {
    /// Only listed tenants are active.
    pub fn new(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: RwLock::new(tenants.into_iter().collect()),
            admit_unlisted: false,
        }
    }

    /// Every tenant passes the presence check; the listed ones are the set
    /// handed to periodic reconciliation.
    pub fn permissive(tenants: impl IntoIterator<Item = TenantId>) -> Self {
        Self {
            tenants: RwLock::new(tenants.into_iter().collect()),
            admit_unlisted: true,
        }
    }

    pub async fn join(&self, tenant_id: TenantId) {
        self.tenants.write().await.insert(tenant_id);
    }

    pub async fn leave(&self, tenant_id: &TenantId) {
        self.tenants.write().await.remove(tenant_id);
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn is_active(&self, tenant_id: &TenantId) -> GuildCfgResult<bool> {
        if self.admit_unlisted {
            return Ok(true);
        }
        Ok(self.tenants.read().await.contains(tenant_id))
    }

    async fn active_tenants(&self) -> GuildCfgResult<Vec<TenantId>> {
        Ok(self.tenants.read().await.iter().cloned().collect())
    }
}
