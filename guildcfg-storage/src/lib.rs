//! guildcfg Storage - Repository Traits and Backends
//!
//! The durable store and the cache mirror are modelled as two separate
//! repository interfaces so that a coordinator can handle propagation
//! failures between them explicitly.
//!
//! Backends:
//! - in-memory ([`memory`]) for tests and local development, with failure
//!   injection hooks
//! - PostgreSQL ([`postgres`]) for the durable side
//! - LMDB ([`lmdb`]) for the cache side, rate windows included

pub mod cache;
pub mod durable;
pub mod lmdb;
pub mod memory;
pub mod postgres;
pub mod window;

pub use cache::{CacheRepo, CacheResult};
pub use durable::{AuditTrail, DurableRepo, StorageResult};
pub use lmdb::{LmdbCacheRepo, LmdbConfig};
pub use memory::{InMemoryCacheRepo, InMemoryDurableRepo};
pub use postgres::{DbConfig, PgDurableRepo};
pub use window::{RateWindow, SlidingWindowStore, WindowDecision};
