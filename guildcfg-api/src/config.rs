//! Server Configuration
//!
//! Settings for the `guildcfg-api` binary. Engine tuning lives in
//! [`guildcfg_core::EngineConfig`]; database and cache settings in the
//! storage crate.

use std::net::SocketAddr;

use guildcfg_core::{ConfigError, TenantId};

use crate::telemetry::LogFormat;

/// Which backends the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL for the durable store, LMDB for the cache.
    Persistent,
    /// Process memory only. Local development.
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub backend: StorageBackend,
    /// Tenants the bot is currently joined to.
    pub active_tenants: Vec<TenantId>,
    /// Let unlisted tenants pass the presence check.
    pub admit_unlisted: bool,
    /// Maximum number of requests in flight.
    pub max_concurrency: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            backend: StorageBackend::Persistent,
            active_tenants: Vec::new(),
            admit_unlisted: false,
            max_concurrency: 256,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `GUILDCFG_API_BIND`: Bind address (default: 0.0.0.0)
    /// - `PORT` or `GUILDCFG_API_PORT`: Port (default: 3000)
    /// - `GUILDCFG_STORAGE`: `persistent` or `memory` (default: persistent)
    /// - `GUILDCFG_ACTIVE_TENANTS`: Comma-separated active tenant ids
    /// - `GUILDCFG_ADMIT_UNLISTED`: Admit tenants not in the list (default: false)
    /// - `GUILDCFG_API_MAX_CONCURRENCY`: In-flight request limit (default: 256)
    /// - `GUILDCFG_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind = std::env::var("GUILDCFG_API_BIND").unwrap_or(defaults.bind);

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("GUILDCFG_API_PORT").ok())
        {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                field: "GUILDCFG_API_PORT".to_string(),
                value: raw.clone(),
                reason: "must be a port number".to_string(),
            })?,
            None => defaults.port,
        };

        let backend = match std::env::var("GUILDCFG_STORAGE").ok().as_deref() {
            None | Some("persistent") => StorageBackend::Persistent,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "GUILDCFG_STORAGE".to_string(),
                    value: other.to_string(),
                    reason: "expected 'persistent' or 'memory'".to_string(),
                })
            }
        };

        let active_tenants = match std::env::var("GUILDCFG_ACTIVE_TENANTS") {
            Ok(raw) => parse_tenant_list(&raw)?,
            Err(_) => Vec::new(),
        };

        let admit_unlisted = std::env::var("GUILDCFG_ADMIT_UNLISTED")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.admit_unlisted);

        let max_concurrency = std::env::var("GUILDCFG_API_MAX_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_concurrency);

        let log_format = std::env::var("GUILDCFG_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or(defaults.log_format);

        Ok(Self {
            bind,
            port,
            backend,
            active_tenants,
            admit_unlisted,
            max_concurrency,
            log_format,
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidValue {
            field: "GUILDCFG_API_BIND".to_string(),
            value: addr.clone(),
            reason: "not a valid socket address".to_string(),
        })
    }
}

/// Parse a comma-separated tenant list, ignoring blank entries.
pub fn parse_tenant_list(raw: &str) -> Result<Vec<TenantId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            TenantId::parse(s).map_err(|e| ConfigError::InvalidValue {
                field: "GUILDCFG_ACTIVE_TENANTS".to_string(),
                value: s.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}
