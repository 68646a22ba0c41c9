//! guildcfg API Server Entry Point
//!
//! Bootstraps configuration and backends, reconciles the cache with the
//! durable store, starts the background jobs and serves HTTP until Ctrl-C.

use std::sync::Arc;

use guildcfg_api::telemetry::init_tracing;
use guildcfg_api::{create_app, ApiError, ApiResult, AppState, ServerConfig, StorageBackend};
use guildcfg_core::EngineConfig;
use guildcfg_engine::{
    ConfigService, RateLimiter, ReconcileJob, Reconciler, RetentionJob, StaticTenantDirectory,
    TenantDirectory,
};
use guildcfg_storage::{
    AuditTrail, CacheRepo, DbConfig, DurableRepo, InMemoryCacheRepo, InMemoryDurableRepo,
    LmdbCacheRepo, LmdbConfig, PgDurableRepo, SlidingWindowStore,
};

struct Backends {
    durable: Arc<dyn DurableRepo>,
    audit: Arc<dyn AuditTrail>,
    cache: Arc<dyn CacheRepo>,
    windows: Arc<dyn SlidingWindowStore>,
}

async fn open_backends(backend: StorageBackend) -> ApiResult<Backends> {
    match backend {
        StorageBackend::Persistent => {
            let durable = Arc::new(PgDurableRepo::from_config(&DbConfig::from_env())?);
            durable.ensure_schema().await?;
            let cache = Arc::new(LmdbCacheRepo::from_config(&LmdbConfig::from_env())?);
            Ok(Backends {
                durable: durable.clone(),
                audit: durable,
                cache: cache.clone(),
                windows: cache,
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("Running with in-memory storage, data is lost on exit");
            let durable = Arc::new(InMemoryDurableRepo::new());
            let cache = Arc::new(InMemoryCacheRepo::new());
            Ok(Backends {
                durable: durable.clone(),
                audit: durable,
                cache: cache.clone(),
                windows: cache,
            })
        }
    }
}

#[tokio::main]
async fn main() -> ApiResult<()> {
    let server_config = ServerConfig::from_env()?;
    init_tracing(server_config.log_format)?;

    let engine_config = EngineConfig::from_env();
    engine_config.validate()?;

    let backends = open_backends(server_config.backend).await?;

    // A cache we cannot reconcile is not served from.
    let reconciler = Arc::new(Reconciler::new(
        backends.durable.clone(),
        backends.cache.clone(),
    ));
    let report = reconciler.startup().await?;
    tracing::info!(
        mode = %report.mode,
        repaired = report.repaired,
        failed = report.failed,
        "Startup reconciliation complete"
    );

    let directory: Arc<dyn TenantDirectory> = if server_config.admit_unlisted {
        Arc::new(StaticTenantDirectory::permissive(
            server_config.active_tenants.clone(),
        ))
    } else {
        Arc::new(StaticTenantDirectory::new(
            server_config.active_tenants.clone(),
        ))
    };

    let limiter = RateLimiter::new(backends.windows.clone());
    let service = ConfigService::new(
        backends.durable.clone(),
        backends.cache.clone(),
        directory.clone(),
        limiter.clone(),
        engine_config.clone(),
    );

    let reconcile_job = ReconcileJob::new(reconciler, directory, engine_config.reconcile_interval)
        .with_window_sweep(limiter)
        .spawn();
    let retention_job = RetentionJob::new(
        backends.audit.clone(),
        engine_config.audit_retention_days,
        engine_config.retention_run_hour,
    )
    .spawn();

    let app = create_app(AppState::new(service), server_config.max_concurrency);

    let addr = server_config.socket_addr()?;
    tracing::info!(%addr, backend = ?server_config.backend, "Starting guildcfg API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    if let Some(metrics) = reconcile_job.stop().await {
        tracing::info!(
            runs = metrics.runs,
            repaired = metrics.repaired,
            windows_purged = metrics.windows_purged,
            "Reconcile job stopped"
        );
    }
    if let Some(metrics) = retention_job.stop().await {
        tracing::info!(
            runs = metrics.runs,
            pruned = metrics.entries_pruned,
            "Retention job stopped"
        );
    }

    Ok(())
}
