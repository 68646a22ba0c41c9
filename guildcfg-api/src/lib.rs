//! guildcfg API - HTTP Layer
//!
//! Exposes the per-guild channel whitelist over REST. Every write is
//! guarded by an `If-Match` version precondition; the response reports the
//! new version as an `ETag`.
//!
//! The acting user arrives in the `x-actor-id` header from the
//! authentication layer in front of this service.

pub mod config;
pub mod error;
pub mod extractors;
pub mod precondition;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use config::{ServerConfig, StorageBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use state::AppState;

/// Router with request tracing and an in-flight request limit.
pub fn create_app(state: AppState, max_concurrency: usize) -> Router {
    create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(GlobalConcurrencyLimitLayer::new(max_concurrency.max(1))),
    )
}
