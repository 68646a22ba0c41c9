//! Configuration service: the coordinator between the durable store and the
//! cache mirror.
//!
//! An update walks these steps in order:
//!
//! 1. rate limit check (rejected: [`GuildCfgError::RateLimited`])
//! 2. input validation, before any transaction is opened
//! 3. tenant presence check
//! 4. version check and durable transaction (conflict: `VersionConflict`,
//!    abort: `TransactionFailed`)
//! 5. cache propagation (failure: [`GuildCfgError::CachePropagation`] carrying
//!    the committed version; the durable write is never rolled back)
//! 6. change notification (failure: success with
//!    [`Propagation::NotifyDelayed`])
//!
//! No lock is held between step 4 and step 5. A timed-out update has an
//! unknown outcome; the service never retries one on the caller's behalf.

use std::sync::Arc;

use guildcfg_core::{
    ActorId, CachedConfig, ConfigChangeEvent, ConfigUpdate, EngineConfig, GuildCfgError,
    GuildCfgResult, GuildConfig, TenantId, Version,
};
use guildcfg_storage::{CacheRepo, DurableRepo};

use crate::directory::TenantDirectory;
use crate::rate_limit::{read_key, write_key, RateLimitOutcome, RateLimiter};

/// A whitelist replacement guarded by an expected version.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub tenant_id: TenantId,
    pub actor: ActorId,
    pub expected_version: Version,
    pub update: ConfigUpdate,
}

/// How far a committed update got beyond the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Cache written and change event published.
    Complete,
    /// Cache written, but the change event could not be published.
    NotifyDelayed,
}

#[derive(Debug, Clone)]
pub struct UpdateReceipt {
    pub config: GuildConfig,
    pub propagation: Propagation,
}

impl UpdateReceipt {
    pub fn warning(&self) -> Option<&'static str> {
        match self.propagation {
            Propagation::Complete => None,
            Propagation::NotifyDelayed => {
                Some("Configuration saved; change notification delayed, consumers may take longer to observe it")
            }
        }
    }
}

#[derive(Clone)]
pub struct ConfigService {
    durable: Arc<dyn DurableRepo>,
    cache: Arc<dyn CacheRepo>,
    directory: Arc<dyn TenantDirectory>,
    limiter: RateLimiter,
    config: EngineConfig,
}

impl ConfigService {
    pub fn new(
        durable: Arc<dyn DurableRepo>,
        cache: Arc<dyn CacheRepo>,
        directory: Arc<dyn TenantDirectory>,
        limiter: RateLimiter,
        config: EngineConfig,
    ) -> Self {
        Self {
            durable,
            cache,
            directory,
            limiter,
            config,
        }
    }

    /// Read a tenant's configuration, creating the default row on first
    /// access.
    pub async fn get_config(
        &self,
        actor: &ActorId,
        tenant_id: &TenantId,
    ) -> GuildCfgResult<GuildConfig> {
        self.limiter
            .enforce(&read_key(actor), self.config.read_rate)
            .await?;
        self.ensure_active(tenant_id).await?;

        if let Some(config) = self.durable.get(tenant_id).await? {
            return Ok(config);
        }

        let config = self
            .durable
            .create_default(tenant_id, &ActorId::system())
            .await?;
        self.mirror_best_effort(&config).await;
        Ok(config)
    }

    /// Apply an optimistic-concurrency update and propagate it.
    pub async fn update_config(&self, request: UpdateRequest) -> GuildCfgResult<UpdateReceipt> {
        self.admit_write(&request.actor).await?;
        self.apply_update(request).await
    }

    /// Count one write attempt by `actor` against the write budget.
    ///
    /// Callers that parse the request themselves run this first, so
    /// malformed requests consume budget too.
    pub async fn admit_write(&self, actor: &ActorId) -> GuildCfgResult<RateLimitOutcome> {
        self.limiter
            .enforce(&write_key(actor), self.config.write_rate)
            .await
    }

    /// [`ConfigService::update_config`] for a request already admitted by
    /// [`ConfigService::admit_write`].
    pub async fn apply_update(&self, request: UpdateRequest) -> GuildCfgResult<UpdateReceipt> {
        let UpdateRequest {
            tenant_id,
            actor,
            expected_version,
            update,
        } = request;

        let update = update.validate()?;
        self.ensure_active(&tenant_id).await?;

        let config = self
            .durable
            .update(&tenant_id, expected_version, &update, &actor)
            .await
            .map_err(|e| {
                tracing::info!(tenant_id = %tenant_id, expected_version, error = %e, "Update rejected");
                GuildCfgError::from(e)
            })?;

        tracing::info!(
            tenant_id = %tenant_id,
            actor = %actor,
            version = config.version,
            allow_all_channels = config.allow_all_channels,
            whitelist_len = config.whitelist.len(),
            "Configuration committed"
        );

        if let Err(e) = self.cache.write(&CachedConfig::from(&config)).await {
            tracing::error!(
                tenant_id = %tenant_id,
                committed_version = config.version,
                error = %e,
                "Cache propagation failed after commit"
            );
            return Err(GuildCfgError::CachePropagation {
                tenant_id: tenant_id.to_string(),
                committed_version: config.version,
                reason: e.to_string(),
            });
        }

        let propagation = match self.cache.notify(&ConfigChangeEvent::from(&config)).await {
            Ok(()) => Propagation::Complete,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    version = config.version,
                    error = %e,
                    "Change notification failed"
                );
                Propagation::NotifyDelayed
            }
        };

        Ok(UpdateReceipt {
            config,
            propagation,
        })
    }

    async fn ensure_active(&self, tenant_id: &TenantId) -> GuildCfgResult<()> {
        if self.directory.is_active(tenant_id).await? {
            Ok(())
        } else {
            Err(GuildCfgError::TenantNotActive {
                tenant_id: tenant_id.to_string(),
            })
        }
    }

    /// Mirror a freshly created row. Reconciliation covers any failure here.
    async fn mirror_best_effort(&self, config: &GuildConfig) {
        if let Err(e) = self.cache.write(&CachedConfig::from(config)).await {
            tracing::warn!(tenant_id = %config.tenant_id, error = %e, "Failed to mirror default configuration");
            return;
        }
        if let Err(e) = self.cache.notify(&ConfigChangeEvent::from(config)).await {
            tracing::warn!(tenant_id = %config.tenant_id, error = %e, "Failed to publish default configuration");
        }
    }
}
