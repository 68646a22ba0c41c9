//! Shared application state for Axum routers.

use std::time::Instant;

use guildcfg_engine::ConfigService;

#[derive(Clone)]
pub struct AppState {
    pub service: ConfigService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: ConfigService) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }
}
