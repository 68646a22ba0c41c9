//! Identity newtypes for tenants and actors.
//!
//! Tenant and actor identifiers are opaque strings issued by external
//! collaborators. The newtypes keep them from being mixed up and make sure a
//! tenant id can always be embedded in a cache key without aliasing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{SCHEMA_VERSION_SUFFIX, SYSTEM_ACTOR};
use crate::error::ValidationError;

/// Identifier of a tenant (one guild).
///
/// Construct through [`TenantId::parse`]; deserialization goes through the
/// same checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parse and validate a tenant id.
    ///
    /// Rejects empty ids, ids containing `:` (the cache key separator) and
    /// the reserved `schema_version` id, which would otherwise alias the
    /// schema marker key `config:schema_version`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "tenantId".to_string(),
            });
        }
        if raw.contains(':') {
            return Err(ValidationError::InvalidValue {
                field: "tenantId".to_string(),
                reason: "must not contain ':'".to_string(),
            });
        }
        if raw == SCHEMA_VERSION_SUFFIX {
            return Err(ValidationError::InvalidValue {
                field: "tenantId".to_string(),
                reason: format!("'{}' is reserved", SCHEMA_VERSION_SUFFIX),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of whoever performed a write: a user id or the system actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel actor used for engine-initiated writes.
    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ACTOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_accepts_snowflake() {
        let id = TenantId::parse("123456789012345678").unwrap();
        assert_eq!(id.as_str(), "123456789012345678");
        assert_eq!(id.to_string(), "123456789012345678");
    }

    #[test]
    fn test_tenant_id_rejects_reserved_and_malformed() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("   ").is_err());
        assert!(TenantId::parse("a:b").is_err());
        assert!(TenantId::parse("schema_version").is_err());
    }

    #[test]
    fn test_tenant_id_deserialize_validates() {
        let ok: Result<TenantId, _> = serde_json::from_str("\"guild-1\"");
        assert!(ok.is_ok());
        let bad: Result<TenantId, _> = serde_json::from_str("\"schema_version\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_system_actor() {
        assert!(ActorId::system().is_system());
        assert!(!ActorId::new("user-1").is_system());
        assert_eq!(ActorId::system().as_str(), "system");
    }
}
