//! Periodic Reconcile Job
//!
//! Every `interval` (default 10 minutes) the job asks the tenant directory
//! for the active set and repairs the cache entries of those tenants. If the
//! cache lost its schema marker since the last run, every durable tenant is
//! repopulated first and the marker restored. When a rate limiter is
//! attached, rate-limit windows that have fully expired are deleted on the
//! same schedule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use guildcfg_core::GuildCfgResult;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{shutdown_requested, JobHandle};
use crate::directory::TenantDirectory;
use crate::rate_limit::RateLimiter;
use crate::reconcile::{ReconcileReport, Reconciler};

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    pub runs: AtomicU64,
    pub repaired: AtomicU64,
    pub created: AtomicU64,
    /// Per-tenant failures.
    pub failed: AtomicU64,
    /// Runs that aborted as a whole.
    pub errors: AtomicU64,
    pub windows_purged: AtomicU64,
}

impl ReconcileMetrics {
    pub fn snapshot(&self) -> ReconcileSnapshot {
        ReconcileSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            repaired: self.repaired.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            windows_purged: self.windows_purged.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &ReconcileReport) {
        self.repaired.fetch_add(report.repaired, Ordering::Relaxed);
        self.created.fetch_add(report.created, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSnapshot {
    pub runs: u64,
    pub repaired: u64,
    pub created: u64,
    pub failed: u64,
    pub errors: u64,
    pub windows_purged: u64,
}

// ============================================================================
// JOB
// ============================================================================

pub struct ReconcileJob {
    reconciler: Arc<Reconciler>,
    directory: Arc<dyn TenantDirectory>,
    limiter: Option<RateLimiter>,
    interval: Duration,
    metrics: Arc<ReconcileMetrics>,
}

impl ReconcileJob {
    pub fn new(
        reconciler: Arc<Reconciler>,
        directory: Arc<dyn TenantDirectory>,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            directory,
            limiter: None,
            interval,
            metrics: Arc::new(ReconcileMetrics::default()),
        }
    }

    /// Also delete expired rate-limit windows on every tick.
    pub fn with_window_sweep(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn metrics(&self) -> Arc<ReconcileMetrics> {
        self.metrics.clone()
    }

    /// Run one reconcile pass over the active tenant set.
    pub async fn tick(&self) -> GuildCfgResult<ReconcileReport> {
        self.metrics.runs.fetch_add(1, Ordering::Relaxed);
        self.sweep_windows().await;
        match self.run_once().await {
            Ok(report) => {
                self.metrics.record(&report);
                Ok(report)
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Periodic reconcile failed, retrying next interval");
                Err(e)
            }
        }
    }

    async fn sweep_windows(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        match limiter.purge_expired_at(Utc::now()).await {
            Ok(purged) => {
                self.metrics.windows_purged.fetch_add(purged, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(error = %e, "Rate limit window sweep failed"),
        }
    }

    async fn run_once(&self) -> GuildCfgResult<ReconcileReport> {
        if let Some(restored) = self.reconciler.restore_lost_marker().await? {
            self.metrics.record(&restored);
        }
        let active = self.directory.active_tenants().await?;
        self.reconciler.reconcile_active(&active).await
    }

    /// Start the timer loop. The first run happens one interval from now;
    /// startup reconciliation covers the time before it.
    pub fn spawn(self) -> JobHandle<ReconcileSnapshot> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "Reconcile job started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if shutdown_requested(changed, &shutdown_rx) {
                            tracing::info!("Reconcile job shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let _ = self.tick().await;
                    }
                }
            }

            let snapshot = self.metrics.snapshot();
            tracing::info!(
                runs = snapshot.runs,
                repaired = snapshot.repaired,
                created = snapshot.created,
                failed = snapshot.failed,
                errors = snapshot.errors,
                windows_purged = snapshot.windows_purged,
                "Reconcile job completed"
            );
            snapshot
        });
        JobHandle::new("reconcile", shutdown_tx, task)
    }
}
