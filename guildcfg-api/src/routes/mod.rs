//! REST API Routes
//!
//! - `/api/guilds/:tenant_id/config`: read and replace a guild's channel whitelist
//! - `/health`: liveness probe

pub mod guild_config;
pub mod health;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/guilds/:tenant_id/config",
            get(guild_config::get_config).put(guild_config::update_config),
        )
        .route("/health", get(health::liveness))
        .with_state(state)
}
