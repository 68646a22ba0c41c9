//! In-memory backends.
//!
//! Used by the test suites and for local development. Both repositories
//! expose failure injection hooks so the degraded paths of the engine can be
//! exercised without a real database or cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use guildcfg_core::{
    ActorId, AuditAction, AuditLogEntry, CacheError, CacheKey, CachedConfig, ConfigChangeEvent,
    ConfigDiff, GuildConfig, StorageError, TenantId, Timestamp, ValidatedUpdate, Version,
    CONFIG_NAMESPACE,
};
use tokio::sync::{broadcast, RwLock};

use crate::cache::{CacheRepo, CacheResult};
use crate::durable::{AuditTrail, DurableRepo, StorageResult};
use crate::window::{RateWindow, SlidingWindowStore, WindowDecision};

// ============================================================================
// DURABLE STORE
// ============================================================================

#[derive(Debug, Default)]
struct DurableState {
    configs: HashMap<TenantId, GuildConfig>,
    audit: Vec<AuditLogEntry>,
    next_audit_id: i64,
}

impl DurableState {
    fn append_audit(
        &mut self,
        config: &GuildConfig,
        action: AuditAction,
        old_version: Option<Version>,
        changes: ConfigDiff,
    ) {
        self.next_audit_id += 1;
        self.audit.push(AuditLogEntry {
            id: self.next_audit_id,
            tenant_id: config.tenant_id.clone(),
            actor_id: config.updated_by.clone(),
            action,
            old_version,
            new_version: config.version,
            changes,
            created_at: config.updated_at,
        });
    }
}

/// Durable store held in process memory.
///
/// Each mutation runs under the state write lock, which gives the same
/// all-or-nothing behavior as a database transaction.
#[derive(Debug, Default)]
pub struct InMemoryDurableRepo {
    state: RwLock<DurableState>,
    fail_commits: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryDurableRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutation abort before writing anything.
    pub fn set_commit_failure(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Shift the creation time of every audit entry into the past.
    pub async fn backdate_audit(&self, by: chrono::Duration) {
        let mut state = self.state.write().await;
        for entry in state.audit.iter_mut() {
            entry.created_at -= by;
        }
    }

    /// Number of audit entries across all tenants.
    pub async fn audit_len(&self) -> usize {
        self.state.read().await.audit.len()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn check_commit(&self) -> StorageResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "injected commit failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DurableRepo for InMemoryDurableRepo {
    async fn get(&self, tenant_id: &TenantId) -> StorageResult<Option<GuildConfig>> {
        self.check_available()?;
        Ok(self.state.read().await.configs.get(tenant_id).cloned())
    }

    async fn create_default(
        &self,
        tenant_id: &TenantId,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state.configs.get(tenant_id) {
            return Ok(existing.clone());
        }
        self.check_commit()?;

        let config = GuildConfig::default_for(tenant_id.clone(), actor.clone(), Utc::now());
        state.append_audit(
            &config,
            AuditAction::Create,
            None,
            ConfigDiff::created(&config),
        );
        state.configs.insert(tenant_id.clone(), config.clone());
        Ok(config)
    }

    async fn update(
        &self,
        tenant_id: &TenantId,
        expected_version: Version,
        update: &ValidatedUpdate,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let current = state
            .configs
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                tenant_id: tenant_id.to_string(),
            })?;

        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                tenant_id: tenant_id.to_string(),
                current_version: current.version,
            });
        }
        self.check_commit()?;

        let next = current.next(update, actor.clone(), Utc::now());
        state.append_audit(
            &next,
            AuditAction::Update,
            Some(current.version),
            ConfigDiff::updated(&current, &next),
        );
        state.configs.insert(tenant_id.clone(), next.clone());
        Ok(next)
    }

    async fn list_configs(&self) -> StorageResult<Vec<GuildConfig>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut configs: Vec<GuildConfig> = state.configs.values().cloned().collect();
        configs.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(configs)
    }

    async fn list_tenant_ids(&self) -> StorageResult<Vec<TenantId>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut ids: Vec<TenantId> = state.configs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl AuditTrail for InMemoryDurableRepo {
    async fn entries_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<AuditLogEntry>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| &e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn prune_before(&self, cutoff: Timestamp) -> StorageResult<u64> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let before = state.audit.len();
        state.audit.retain(|e| e.created_at >= cutoff);
        Ok((before - state.audit.len()) as u64)
    }
}

// ============================================================================
// CACHE MIRROR
// ============================================================================

/// Cache keyspace held in process memory: raw string keys to JSON values,
/// laid out exactly like the real cache.
#[derive(Debug)]
pub struct InMemoryCacheRepo {
    entries: RwLock<BTreeMap<String, String>>,
    windows: DashMap<String, RateWindow>,
    events: broadcast::Sender<ConfigChangeEvent>,
    unavailable: AtomicBool,
    notify_failure: AtomicBool,
    failing_writes: DashSet<TenantId>,
}

impl Default for InMemoryCacheRepo {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            windows: DashMap::new(),
            events,
            unavailable: AtomicBool::new(false),
            notify_failure: AtomicBool::new(false),
            failing_writes: DashSet::new(),
        }
    }
}

impl InMemoryCacheRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the cache server were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes for one tenant fail while everything else works.
    pub fn fail_writes_for(&self, tenant_id: &TenantId) {
        self.failing_writes.insert(tenant_id.clone());
    }

    pub fn clear_write_failures(&self) {
        self.failing_writes.clear();
    }

    pub fn set_notify_failure(&self, fail: bool) {
        self.notify_failure.store(fail, Ordering::SeqCst);
    }

    /// Drop one tenant's entry, as if it had been lost.
    pub async fn evict(&self, tenant_id: &TenantId) {
        let key = CacheKey::Config(tenant_id.clone()).encode();
        self.entries.write().await.remove(&key);
    }

    /// Drop everything, schema marker and rate windows included.
    pub async fn flush_all(&self) {
        self.entries.write().await.clear();
        self.windows.clear();
    }

    /// Store a raw value under a raw key.
    pub async fn put_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    /// Number of stored rate-limit windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Copy of every key and value under `config:`.
    pub async fn config_namespace(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(k, _)| CacheKey::in_config_namespace(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: "in-memory cache marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheRepo for InMemoryCacheRepo {
    async fn write(&self, config: &CachedConfig) -> CacheResult<()> {
        self.check_available()?;
        if self.failing_writes.contains(&config.tenant_id) {
            return Err(CacheError::Backend {
                reason: format!("injected write failure for {}", config.tenant_id),
            });
        }
        let value = serde_json::to_string(config).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let key = CacheKey::Config(config.tenant_id.clone()).encode();
        self.entries.write().await.insert(key, value);
        Ok(())
    }

    async fn read(&self, tenant_id: &TenantId) -> CacheResult<Option<CachedConfig>> {
        self.check_available()?;
        let key = CacheKey::Config(tenant_id.clone()).encode();
        let entries = self.entries.read().await;
        match entries.get(&key) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn exists(&self, tenant_id: &TenantId) -> CacheResult<bool> {
        self.check_available()?;
        let key = CacheKey::Config(tenant_id.clone()).encode();
        Ok(self.entries.read().await.contains_key(&key))
    }

    async fn notify(&self, event: &ConfigChangeEvent) -> CacheResult<()> {
        self.check_available()?;
        if self.notify_failure.load(Ordering::SeqCst) {
            return Err(CacheError::NotifyFailed {
                reason: "injected publish failure".to_string(),
            });
        }
        // No receivers is fine.
        let _ = self.events.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.events.subscribe()
    }

    async fn schema_version(&self) -> CacheResult<Option<i64>> {
        self.check_available()?;
        let key = CacheKey::SchemaVersion.encode();
        Ok(self
            .entries
            .read()
            .await
            .get(&key)
            .and_then(|raw| raw.trim().parse().ok()))
    }

    async fn set_schema_version(&self, version: i64) -> CacheResult<()> {
        self.check_available()?;
        let key = CacheKey::SchemaVersion.encode();
        self.entries.write().await.insert(key, version.to_string());
        Ok(())
    }

    async fn clear_namespace(&self) -> CacheResult<u64> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(CONFIG_NAMESPACE));
        Ok((before - entries.len()) as u64)
    }
}

#[async_trait]
impl SlidingWindowStore for InMemoryCacheRepo {
    async fn hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> CacheResult<WindowDecision> {
        self.check_available()?;
        let key = CacheKey::RateLimit(key.to_string()).encode();
        // The entry guard holds the shard lock for the whole evaluation.
        let mut window = self.windows.entry(key).or_default();
        Ok(window.hit(now_ms, window_ms, limit))
    }

    async fn purge_expired(&self, now_ms: i64) -> CacheResult<u64> {
        self.check_available()?;
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now_ms));
        Ok(before.saturating_sub(self.windows.len()) as u64)
    }
}
