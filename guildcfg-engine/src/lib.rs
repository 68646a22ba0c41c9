//! guildcfg Engine - Consistency Engine
//!
//! Keeps the cache mirror faithful to the durable store under concurrent
//! writers, restarts and partial failures:
//!
//! - [`ConfigService`]: optimistic-concurrency updates with cache
//!   propagation and change notification
//! - [`Reconciler`]: startup reseed or partial repair, and periodic repair of
//!   the active tenant set
//! - [`RateLimiter`]: atomic sliding-window limiter guarding the API
//! - [`jobs`]: scheduled reconcile and audit retention tasks
//!
//! All store handles are passed in explicitly; nothing here is a global.

pub mod directory;
pub mod jobs;
pub mod rate_limit;
pub mod reconcile;
pub mod service;

pub use directory::{StaticTenantDirectory, TenantDirectory};
pub use jobs::{JobHandle, ReconcileJob, RetentionJob};
pub use rate_limit::{read_key, write_key, RateLimitOutcome, RateLimiter};
pub use reconcile::{ReconcileMode, ReconcileReport, Reconciler};
pub use service::{ConfigService, Propagation, UpdateReceipt, UpdateRequest};
