//! Cache key layout.

use std::fmt;

use crate::constants::{CONFIG_NAMESPACE, RATE_LIMIT_NAMESPACE, SCHEMA_VERSION_SUFFIX};
use crate::identity::TenantId;

/// A key in the cache keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `config:{tenantId}`
    Config(TenantId),
    /// `config:schema_version`
    SchemaVersion,
    /// `ratelimit:{identifier}`
    RateLimit(String),
}

impl CacheKey {
    pub fn encode(&self) -> String {
        match self {
            CacheKey::Config(tenant) => format!("{}{}", CONFIG_NAMESPACE, tenant),
            CacheKey::SchemaVersion => format!("{}{}", CONFIG_NAMESPACE, SCHEMA_VERSION_SUFFIX),
            CacheKey::RateLimit(id) => format!("{}{}", RATE_LIMIT_NAMESPACE, id),
        }
    }

    /// True for keys living under `config:`, the marker included.
    pub fn in_config_namespace(raw: &str) -> bool {
        raw.starts_with(CONFIG_NAMESPACE)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
