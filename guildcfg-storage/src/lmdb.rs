//! LMDB-backed cache mirror.
//!
//! Uses the heed crate (Rust bindings for LMDB). Keys are the plain strings
//! of the cache key layout (`config:{tenantId}`, `config:schema_version`,
//! `ratelimit:{identifier}`), values are JSON.
//!
//! # Atomicity
//!
//! LMDB admits one write transaction at a time. Rate windows are read,
//! evaluated and written back inside a single write transaction, so the
//! check-count-record step cannot interleave with another request.
//!
//! # Notifications
//!
//! `config:update` events go out on an in-process broadcast channel; there is
//! no persisted backlog.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use guildcfg_core::{
    CacheError, CacheKey, CachedConfig, ConfigChangeEvent, TenantId, CONFIG_NAMESPACE,
    CONFIG_UPDATE_CHANNEL, RATE_LIMIT_NAMESPACE,
};
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use tokio::sync::broadcast;

use crate::cache::{CacheRepo, CacheResult};
use crate::window::{RateWindow, SlidingWindowStore, WindowDecision};

/// Capacity of the notification channel before slow receivers lag.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbConfig {
    /// Directory holding the LMDB files.
    pub path: PathBuf,
    /// Maximum map size in megabytes.
    pub max_size_mb: usize,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/guildcfg-cache"),
            max_size_mb: 64,
        }
    }
}

impl LmdbConfig {
    /// Read `GUILDCFG_CACHE_PATH` and `GUILDCFG_CACHE_MAX_SIZE_MB`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("GUILDCFG_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("GUILDCFG_CACHE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        }
    }
}

// ============================================================================
// BACKEND
// ============================================================================

pub struct LmdbCacheRepo {
    env: Env,
    db: Database<Str, Str>,
    events: broadcast::Sender<ConfigChangeEvent>,
}

impl LmdbCacheRepo {
    /// Open (or create) the cache under `path`.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> CacheResult<Self> {
        std::fs::create_dir_all(&path).map_err(unavailable)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(unavailable)?;

        let mut wtxn = env.write_txn().map_err(unavailable)?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::info!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB cache");
        Ok(Self { env, db, events })
    }

    pub fn from_config(config: &LmdbConfig) -> CacheResult<Self> {
        Self::open(&config.path, config.max_size_mb)
    }

    fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let rtxn = self.env.read_txn().map_err(backend)?;
        Ok(self.db.get(&rtxn, key).map_err(backend)?.map(str::to_owned))
    }

    fn put_raw(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        self.db.put(&mut wtxn, key, value).map_err(backend)?;
        wtxn.commit().map_err(backend)
    }

    fn keys_with_prefix(&self, txn: &RoTxn, prefix: &str) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in self.db.prefix_iter(txn, prefix).map_err(backend)? {
            let (key, _) = entry.map_err(backend)?;
            keys.push(key.to_owned());
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheRepo for LmdbCacheRepo {
    async fn write(&self, config: &CachedConfig) -> CacheResult<()> {
        let value = serde_json::to_string(config).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.put_raw(&CacheKey::Config(config.tenant_id.clone()).encode(), &value)
    }

    async fn read(&self, tenant_id: &TenantId) -> CacheResult<Option<CachedConfig>> {
        match self.get_raw(&CacheKey::Config(tenant_id.clone()).encode())? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn exists(&self, tenant_id: &TenantId) -> CacheResult<bool> {
        Ok(self
            .get_raw(&CacheKey::Config(tenant_id.clone()).encode())?
            .is_some())
    }

    async fn notify(&self, event: &ConfigChangeEvent) -> CacheResult<()> {
        let receivers = self.events.send(event.clone()).unwrap_or(0);
        tracing::trace!(
            channel = CONFIG_UPDATE_CHANNEL,
            tenant_id = %event.tenant_id,
            version = event.version,
            receivers,
            "Published change notification"
        );
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.events.subscribe()
    }

    async fn schema_version(&self) -> CacheResult<Option<i64>> {
        let raw = self.get_raw(&CacheKey::SchemaVersion.encode())?;
        Ok(raw.and_then(|v| match v.trim().parse() {
            Ok(version) => Some(version),
            Err(_) => {
                tracing::warn!(value = %v, "Unreadable schema marker");
                None
            }
        }))
    }

    async fn set_schema_version(&self, version: i64) -> CacheResult<()> {
        self.put_raw(&CacheKey::SchemaVersion.encode(), &version.to_string())
    }

    async fn clear_namespace(&self) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        let keys = self.keys_with_prefix(&wtxn, CONFIG_NAMESPACE)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(backend)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(backend)?;
        Ok(deleted)
    }
}

#[async_trait]
impl SlidingWindowStore for LmdbCacheRepo {
    async fn hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> CacheResult<WindowDecision> {
        let key = CacheKey::RateLimit(key.to_string()).encode();
        let mut wtxn = self.env.write_txn().map_err(backend)?;

        let mut window: RateWindow = match self.db.get(&wtxn, &key).map_err(backend)? {
            Some(raw) => serde_json::from_str(raw).unwrap_or_default(),
            None => RateWindow::default(),
        };
        let decision = window.hit(now_ms, window_ms, limit);

        if decision.allowed {
            let value = serde_json::to_string(&window).map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
            self.db.put(&mut wtxn, &key, &value).map_err(backend)?;
            wtxn.commit().map_err(backend)?;
        }
        Ok(decision)
    }

    async fn purge_expired(&self, now_ms: i64) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(backend)?;
        let mut expired = Vec::new();
        for entry in self
            .db
            .prefix_iter(&wtxn, RATE_LIMIT_NAMESPACE)
            .map_err(backend)?
        {
            let (key, raw) = entry.map_err(backend)?;
            // Unreadable windows carry no usable state either.
            let stale = serde_json::from_str::<RateWindow>(raw)
                .map(|window| window.is_expired(now_ms))
                .unwrap_or(true);
            if stale {
                expired.push(key.to_owned());
            }
        }
        for key in &expired {
            self.db.delete(&mut wtxn, key).map_err(backend)?;
        }
        wtxn.commit().map_err(backend)?;
        Ok(expired.len() as u64)
    }
}

fn unavailable(e: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable {
        reason: e.to_string(),
    }
}

fn backend(e: heed::Error) -> CacheError {
    CacheError::Backend {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use guildcfg_core::{ActorId, GuildConfig};
    use tempfile::TempDir;

    fn create_test_repo() -> (LmdbCacheRepo, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let repo = LmdbCacheRepo::open(temp_dir.path(), 10).expect("repo creation should succeed");
        (repo, temp_dir)
    }

    fn cached(tenant: &str, version: i64) -> CachedConfig {
        let mut config = GuildConfig::default_for(
            TenantId::parse(tenant).expect("valid tenant"),
            ActorId::system(),
            Utc::now(),
        );
        config.version = version;
        CachedConfig::from(&config)
    }

    #[tokio::test]
    async fn test_write_read_exists() {
        let (repo, _dir) = create_test_repo();
        let entry = cached("g1", 3);
        let tenant = entry.tenant_id.clone();

        assert!(!repo.exists(&tenant).await.expect("exists should succeed"));
        repo.write(&entry).await.expect("write should succeed");
        assert!(repo.exists(&tenant).await.expect("exists should succeed"));
        assert_eq!(
            repo.read(&tenant).await.expect("read should succeed"),
            Some(entry)
        );
    }

    #[tokio::test]
    async fn test_stored_value_is_plain_json() {
        let (repo, _dir) = create_test_repo();
        repo.write(&cached("g1", 2)).await.expect("write should succeed");
        let raw = repo
            .get_raw("config:g1")
            .expect("get_raw should succeed")
            .expect("key should exist");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("valid JSON");
        assert_eq!(json["version"], 2);
        assert_eq!(json["tenantId"], "g1");
    }

    #[tokio::test]
    async fn test_clear_namespace_spares_rate_windows() {
        let (repo, _dir) = create_test_repo();
        repo.write(&cached("g1", 1)).await.expect("write should succeed");
        repo.write(&cached("g2", 1)).await.expect("write should succeed");
        repo.set_schema_version(1).await.expect("marker should be set");
        repo.hit("user:1:config:write", 0, 60_000, 5)
            .await
            .expect("hit should succeed");

        let deleted = repo.clear_namespace().await.expect("clear should succeed");
        assert_eq!(deleted, 3);
        assert_eq!(repo.schema_version().await.expect("read marker"), None);
        assert!(repo
            .get_raw("ratelimit:user:1:config:write")
            .expect("get_raw should succeed")
            .is_some());
    }

    #[tokio::test]
    async fn test_schema_marker() {
        let (repo, _dir) = create_test_repo();
        assert_eq!(repo.schema_version().await.expect("read marker"), None);
        repo.set_schema_version(7).await.expect("marker should be set");
        assert_eq!(repo.schema_version().await.expect("read marker"), Some(7));

        repo.put_raw("config:schema_version", "garbage")
            .expect("put_raw should succeed");
        assert_eq!(repo.schema_version().await.expect("read marker"), None);
    }

    #[tokio::test]
    async fn test_rate_window_persists_between_hits() {
        let (repo, _dir) = create_test_repo();
        for t in 0..3 {
            let decision = repo
                .hit("k", t * 10, 1_000, 3)
                .await
                .expect("hit should succeed");
            assert!(decision.allowed);
        }
        let rejected = repo.hit("k", 40, 1_000, 3).await.expect("hit should succeed");
        assert!(!rejected.allowed);
        assert_eq!(rejected.reset_at_ms, 1_000);

        let after = repo.hit("k", 1_000, 1_000, 3).await.expect("hit should succeed");
        assert!(after.allowed);
    }

    #[tokio::test]
    async fn test_purge_drops_expired_windows_only() {
        let (repo, _dir) = create_test_repo();
        for i in 0..100 {
            repo.hit(&format!("user:{}:config:read", i), 0, 1_000, 10)
                .await
                .expect("hit should succeed");
        }
        repo.hit("user:live:config:read", 9_999_500, 1_000, 10)
            .await
            .expect("hit should succeed");
        repo.put_raw("ratelimit:garbled", "not json")
            .expect("put_raw should succeed");
        repo.write(&cached("g1", 1)).await.expect("write should succeed");

        let purged = repo
            .purge_expired(10_000_000)
            .await
            .expect("purge should succeed");
        assert_eq!(purged, 101);

        let rtxn = repo.env.read_txn().expect("read txn");
        let remaining = repo
            .keys_with_prefix(&rtxn, RATE_LIMIT_NAMESPACE)
            .expect("list keys");
        assert_eq!(remaining, vec!["ratelimit:user:live:config:read".to_string()]);
        drop(rtxn);
        assert!(repo.exists(&TenantId::parse("g1").expect("valid tenant")).await.expect("exists"));
    }

    #[tokio::test]
    async fn test_rejected_hit_leaves_window_untouched() {
        let (repo, _dir) = create_test_repo();
        repo.hit("k", 0, 1_000, 1).await.expect("hit should succeed");
        let before = repo.get_raw("ratelimit:k").expect("get_raw should succeed");
        let rejected = repo.hit("k", 10, 1_000, 1).await.expect("hit should succeed");
        assert!(!rejected.allowed);
        assert_eq!(repo.get_raw("ratelimit:k").expect("get_raw should succeed"), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_never_exceed_limit() {
        let (repo, _dir) = create_test_repo();
        let repo = std::sync::Arc::new(repo);
        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.hit("burst", 5_000, 60_000, 5)
                    .await
                    .expect("hit should succeed")
                    .allowed
            }));
        }
        let mut allowed = 0;
        for handle in handles {
            if handle.await.expect("task should join") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_is_ok() {
        let (repo, _dir) = create_test_repo();
        let config = GuildConfig::default_for(
            TenantId::parse("g1").expect("valid tenant"),
            ActorId::system(),
            Utc::now(),
        );
        repo.notify(&ConfigChangeEvent::from(&config))
            .await
            .expect("notify should succeed");

        let mut rx = repo.subscribe();
        repo.notify(&ConfigChangeEvent::from(&config))
            .await
            .expect("notify should succeed");
        assert_eq!(rx.recv().await.expect("event").version, 1);
    }
}
