//! PostgreSQL durable store.
//!
//! Connection pooling uses deadpool-postgres. Every mutation runs in one
//! transaction: the configuration row, its whitelist and the audit entry
//! commit or abort together.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use guildcfg_core::{
    ActorId, AuditAction, AuditLogEntry, ConfigDiff, ConfigError, GuildConfig, StorageError,
    TenantId, Timestamp, ValidatedUpdate, Version, INITIAL_VERSION,
};
use tokio_postgres::{GenericClient, NoTls, Row};

use crate::durable::{AuditTrail, DurableRepo, StorageResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "guildcfg".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read `GUILDCFG_DB_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("GUILDCFG_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("GUILDCFG_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("GUILDCFG_DB_NAME").unwrap_or_else(|_| "guildcfg".to_string()),
            user: std::env::var("GUILDCFG_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("GUILDCFG_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("GUILDCFG_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("GUILDCFG_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, ConfigError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool = deadpool_postgres::PoolConfig::new(self.max_size);
        // Checkouts give up instead of queueing forever on an exhausted pool.
        pool.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConfigError::InvalidValue {
                field: "GUILDCFG_DB_*".to_string(),
                value: format!("{}:{}/{}", self.host, self.port, self.dbname),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS guild_config (
    tenant_id           TEXT PRIMARY KEY,
    allow_all_channels  BOOLEAN NOT NULL DEFAULT TRUE,
    version             BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_by          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_whitelist (
    id          BIGSERIAL PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES guild_config (tenant_id) ON DELETE CASCADE,
    channel_id  TEXT NOT NULL,
    position    INTEGER NOT NULL,
    UNIQUE (tenant_id, channel_id)
);

CREATE TABLE IF NOT EXISTS config_audit_log (
    id           BIGSERIAL PRIMARY KEY,
    tenant_id    TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    action       TEXT NOT NULL CHECK (action IN ('create', 'update')),
    old_version  BIGINT,
    new_version  BIGINT NOT NULL,
    changes      JSONB NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS config_audit_log_created_at_idx
    ON config_audit_log (created_at);
CREATE INDEX IF NOT EXISTS config_audit_log_tenant_idx
    ON config_audit_log (tenant_id, created_at);
"#;

const SELECT_CONFIG: &str = r#"
SELECT g.tenant_id, g.allow_all_channels, g.version, g.updated_at, g.updated_by,
       COALESCE(
           array_agg(w.channel_id ORDER BY w.position) FILTER (WHERE w.channel_id IS NOT NULL),
           '{}'
       ) AS whitelist
FROM guild_config g
LEFT JOIN channel_whitelist w ON w.tenant_id = g.tenant_id
"#;

const INSERT_AUDIT: &str = "INSERT INTO config_audit_log \
     (tenant_id, user_id, action, old_version, new_version, changes, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

// ============================================================================
// REPOSITORY
// ============================================================================

/// Durable store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgDurableRepo {
    pool: Pool,
}

impl PgDurableRepo {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA).await.map_err(pg_err)?;
        tracing::info!("Durable schema ready");
        Ok(())
    }

    async fn conn(&self) -> StorageResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_err)
    }

    async fn fetch_config<C: GenericClient + Sync>(
        client: &C,
        tenant_id: &TenantId,
    ) -> StorageResult<Option<GuildConfig>> {
        let sql = format!("{} WHERE g.tenant_id = $1 GROUP BY g.tenant_id", SELECT_CONFIG);
        let row = client
            .query_opt(&sql, &[&tenant_id.as_str()])
            .await
            .map_err(pg_err)?;
        row.map(|r| row_to_config(&r)).transpose()
    }

    async fn insert_audit<C: GenericClient + Sync>(
        client: &C,
        config: &GuildConfig,
        action: AuditAction,
        old_version: Option<Version>,
        changes: &ConfigDiff,
    ) -> StorageResult<()> {
        let changes = serde_json::to_value(changes).map_err(|e| StorageError::TransactionFailed {
            reason: format!("failed to serialize audit diff: {}", e),
        })?;
        client
            .execute(
                INSERT_AUDIT,
                &[
                    &config.tenant_id.as_str(),
                    &config.updated_by.as_str(),
                    &action.as_str(),
                    &old_version,
                    &config.version,
                    &changes,
                    &config.updated_at,
                ],
            )
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}

#[async_trait]
impl DurableRepo for PgDurableRepo {
    async fn get(&self, tenant_id: &TenantId) -> StorageResult<Option<GuildConfig>> {
        let conn = self.conn().await?;
        Self::fetch_config(&**conn, tenant_id).await
    }

    async fn create_default(
        &self,
        tenant_id: &TenantId,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_err)?;

        let inserted = tx
            .query_opt(
                "INSERT INTO guild_config (tenant_id, allow_all_channels, version, updated_at, updated_by) \
                 VALUES ($1, TRUE, $2, now(), $3) \
                 ON CONFLICT (tenant_id) DO NOTHING \
                 RETURNING updated_at",
                &[&tenant_id.as_str(), &INITIAL_VERSION, &actor.as_str()],
            )
            .await
            .map_err(pg_err)?;

        let Some(row) = inserted else {
            // Lost the race: another caller created the row first. Read it
            // back on this connection; a second checkout could wait forever
            // on an exhausted pool.
            let existing = Self::fetch_config(&*tx, tenant_id).await?;
            tx.commit().await.map_err(pg_err)?;
            return existing.ok_or_else(|| StorageError::TransactionFailed {
                reason: format!("row for tenant {} vanished after conflict", tenant_id),
            });
        };

        let updated_at: Timestamp = row.try_get(0).map_err(pg_err)?;
        let config = GuildConfig::default_for(tenant_id.clone(), actor.clone(), updated_at);
        Self::insert_audit(
            &*tx,
            &config,
            AuditAction::Create,
            None,
            &ConfigDiff::created(&config),
        )
        .await?;
        tx.commit().await.map_err(pg_err)?;

        tracing::info!(tenant_id = %tenant_id, actor = %actor, "Created default configuration");
        Ok(config)
    }

    async fn update(
        &self,
        tenant_id: &TenantId,
        expected_version: Version,
        update: &ValidatedUpdate,
        actor: &ActorId,
    ) -> StorageResult<GuildConfig> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(pg_err)?;

        let locked = tx
            .query_opt(
                "SELECT version FROM guild_config WHERE tenant_id = $1 FOR UPDATE",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(pg_err)?;
        let Some(locked) = locked else {
            return Err(StorageError::NotFound {
                tenant_id: tenant_id.to_string(),
            });
        };
        let current_version: Version = locked.try_get(0).map_err(pg_err)?;
        if current_version != expected_version {
            return Err(StorageError::VersionConflict {
                tenant_id: tenant_id.to_string(),
                current_version,
            });
        }

        let before = Self::fetch_config(&*tx, tenant_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                tenant_id: tenant_id.to_string(),
            })?;
        let mut after = before.next(update, actor.clone(), Utc::now());

        let row = tx
            .query_one(
                "UPDATE guild_config \
                 SET allow_all_channels = $2, version = version + 1, updated_at = $3, updated_by = $4 \
                 WHERE tenant_id = $1 AND version = $5 \
                 RETURNING version, updated_at",
                &[
                    &tenant_id.as_str(),
                    &after.allow_all_channels,
                    &after.updated_at,
                    &actor.as_str(),
                    &expected_version,
                ],
            )
            .await
            .map_err(pg_err)?;
        after.version = row.try_get(0).map_err(pg_err)?;
        after.updated_at = row.try_get(1).map_err(pg_err)?;

        tx.execute(
            "DELETE FROM channel_whitelist WHERE tenant_id = $1",
            &[&tenant_id.as_str()],
        )
        .await
        .map_err(pg_err)?;
        if !after.whitelist.is_empty() {
            tx.execute(
                "INSERT INTO channel_whitelist (tenant_id, channel_id, position) \
                 SELECT $1, c.channel_id, c.ord::INTEGER \
                 FROM unnest($2::TEXT[]) WITH ORDINALITY AS c(channel_id, ord)",
                &[&tenant_id.as_str(), &after.whitelist],
            )
            .await
            .map_err(pg_err)?;
        }

        Self::insert_audit(
            &*tx,
            &after,
            AuditAction::Update,
            Some(before.version),
            &ConfigDiff::updated(&before, &after),
        )
        .await?;
        tx.commit().await.map_err(pg_err)?;

        tracing::debug!(
            tenant_id = %tenant_id,
            version = after.version,
            whitelist_len = after.whitelist.len(),
            "Configuration updated"
        );
        Ok(after)
    }

    async fn list_configs(&self) -> StorageResult<Vec<GuildConfig>> {
        let conn = self.conn().await?;
        let sql = format!("{} GROUP BY g.tenant_id ORDER BY g.tenant_id", SELECT_CONFIG);
        let rows = conn.query(&sql, &[]).await.map_err(pg_err)?;
        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_config(row) {
                Ok(config) => configs.push(config),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable configuration row"),
            }
        }
        Ok(configs)
    }

    async fn list_tenant_ids(&self) -> StorageResult<Vec<TenantId>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT tenant_id FROM guild_config ORDER BY tenant_id", &[])
            .await
            .map_err(pg_err)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = row.try_get(0).map_err(pg_err)?;
            match TenantId::parse(raw.clone()) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(tenant_id = %raw, error = %e, "Skipping invalid tenant id"),
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl AuditTrail for PgDurableRepo {
    async fn entries_for(&self, tenant_id: &TenantId) -> StorageResult<Vec<AuditLogEntry>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id, tenant_id, user_id, action, old_version, new_version, changes, created_at \
                 FROM config_audit_log WHERE tenant_id = $1 ORDER BY id",
                &[&tenant_id.as_str()],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_audit).collect()
    }

    async fn prune_before(&self, cutoff: Timestamp) -> StorageResult<u64> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM config_audit_log WHERE created_at < $1",
            &[&cutoff],
        )
        .await
        .map_err(pg_err)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn row_to_config(row: &Row) -> StorageResult<GuildConfig> {
    let raw_tenant: String = row.try_get("tenant_id").map_err(pg_err)?;
    let tenant_id = TenantId::parse(raw_tenant).map_err(|e| StorageError::TransactionFailed {
        reason: format!("invalid tenant id in store: {}", e),
    })?;
    let updated_by: String = row.try_get("updated_by").map_err(pg_err)?;
    Ok(GuildConfig {
        tenant_id,
        allow_all_channels: row.try_get("allow_all_channels").map_err(pg_err)?,
        whitelist: row.try_get("whitelist").map_err(pg_err)?,
        version: row.try_get("version").map_err(pg_err)?,
        updated_at: row.try_get("updated_at").map_err(pg_err)?,
        updated_by: ActorId::new(updated_by),
    })
}

fn row_to_audit(row: &Row) -> StorageResult<AuditLogEntry> {
    let raw_tenant: String = row.try_get("tenant_id").map_err(pg_err)?;
    let tenant_id = TenantId::parse(raw_tenant).map_err(|e| StorageError::TransactionFailed {
        reason: format!("invalid tenant id in audit log: {}", e),
    })?;
    let raw_action: String = row.try_get("action").map_err(pg_err)?;
    let action = AuditAction::parse(&raw_action).ok_or_else(|| StorageError::TransactionFailed {
        reason: format!("unknown audit action '{}'", raw_action),
    })?;
    let changes: serde_json::Value = row.try_get("changes").map_err(pg_err)?;
    let changes: ConfigDiff =
        serde_json::from_value(changes).map_err(|e| StorageError::TransactionFailed {
            reason: format!("unreadable audit diff: {}", e),
        })?;
    let user_id: String = row.try_get("user_id").map_err(pg_err)?;

    Ok(AuditLogEntry {
        id: row.try_get("id").map_err(pg_err)?,
        tenant_id,
        actor_id: ActorId::new(user_id),
        action,
        old_version: row.try_get("old_version").map_err(pg_err)?,
        new_version: row.try_get("new_version").map_err(pg_err)?,
        changes,
        created_at: row.try_get("created_at").map_err(pg_err)?,
    })
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_err(e: PoolError) -> StorageError {
    tracing::error!(error = %e, "Connection pool error");
    StorageError::Unavailable {
        reason: e.to_string(),
    }
}

fn pg_err(e: tokio_postgres::Error) -> StorageError {
    if e.is_closed() {
        tracing::error!(error = %e, "Database connection closed");
        return StorageError::Unavailable {
            reason: e.to_string(),
        };
    }
    tracing::error!(error = %e, "Database error");
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
}
