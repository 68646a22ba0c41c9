//! guildcfg Test Utilities
//!
//! Shared test infrastructure for the guildcfg workspace:
//! - Proptest generators for identifiers and whitelist submissions
//! - Fixtures wiring the in-memory backends together
//! - Assertions for cache/durable consistency

pub use guildcfg_core::{
    ActorId, CacheError, CachedConfig, ConfigUpdate, GuildCfgError, GuildCfgResult, GuildConfig,
    StorageError, TenantId, ValidatedUpdate, ValidationError, MAX_WHITELIST_SIZE,
};
pub use guildcfg_storage::{InMemoryCacheRepo, InMemoryDurableRepo};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies.

    use super::*;
    use proptest::prelude::*;

    /// Snowflake-like numeric tenant ids.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "[1-9][0-9]{16,18}".prop_map(|s| TenantId::parse(s).expect("generated id is valid"))
    }

    /// A small set of distinct tenant ids.
    pub fn arb_tenant_set(max: usize) -> impl Strategy<Value = Vec<TenantId>> {
        proptest::collection::btree_set(arb_tenant_id(), 0..=max)
            .prop_map(|set| set.into_iter().collect())
    }

    pub fn arb_actor_id() -> impl Strategy<Value = ActorId> {
        "[1-9][0-9]{5,18}".prop_map(ActorId::new)
    }

    pub fn arb_channel_id() -> impl Strategy<Value = String> {
        "[1-9][0-9]{16,18}"
    }

    /// Whitelists within the size limit; duplicates possible.
    pub fn arb_whitelist() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(arb_channel_id(), 0..20)
    }

    pub fn arb_config_update() -> impl Strategy<Value = ConfigUpdate> {
        (any::<bool>(), arb_whitelist())
            .prop_map(|(allow_all, whitelist)| ConfigUpdate::new(allow_all, whitelist))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use std::sync::Arc;

    use super::*;

    #[track_caller]
    pub fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).expect("fixture tenant id is valid")
    }

    pub fn actor(id: &str) -> ActorId {
        ActorId::new(id)
    }

    /// `n` distinct channel ids.
    pub fn channels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("9000000000000{:05}", i)).collect()
    }

    pub fn update(allow_all: bool, channels: &[&str]) -> ConfigUpdate {
        ConfigUpdate::new(allow_all, channels.iter().map(|c| c.to_string()).collect())
    }

    #[track_caller]
    pub fn validated(allow_all: bool, channels: &[&str]) -> ValidatedUpdate {
        update(allow_all, channels)
            .validate()
            .expect("fixture update is valid")
    }

    /// The in-memory durable store and cache, shared behind `Arc`s.
    #[derive(Clone, Default)]
    pub struct InMemoryStores {
        pub durable: Arc<InMemoryDurableRepo>,
        pub cache: Arc<InMemoryCacheRepo>,
    }

    impl InMemoryStores {
        pub fn new() -> Self {
            Self::default()
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers.

    use super::*;
    use guildcfg_storage::{CacheRepo, DurableRepo};

    /// True when the tenant has both a durable row and a cache entry that
    /// mirrors it exactly.
    pub async fn cache_mirrors_durable(
        durable: &dyn DurableRepo,
        cache: &dyn CacheRepo,
        tenant_id: &TenantId,
    ) -> bool {
        let Ok(Some(config)) = durable.get(tenant_id).await else {
            return false;
        };
        matches!(cache.read(tenant_id).await, Ok(Some(cached)) if cached.mirrors(&config))
    }

    /// Assert that a result is a version conflict reporting `expected`.
    #[track_caller]
    pub fn assert_version_conflict<T: std::fmt::Debug>(result: &GuildCfgResult<T>, expected: i64) {
        match result {
            Err(GuildCfgError::Storage(StorageError::VersionConflict {
                current_version, ..
            })) => assert_eq!(*current_version, expected),
            other => panic!("Expected VersionConflict, got: {:?}", other),
        }
    }
}
