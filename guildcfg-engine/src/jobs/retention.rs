//! Audit Retention Job
//!
//! Runs once a day at a fixed local hour and deletes audit entries older
//! than the retention horizon. It only touches the audit log, never the
//! configuration rows, so it cannot block the write path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, TimeZone, Utc};
use guildcfg_core::GuildCfgResult;
use guildcfg_storage::AuditTrail;
use tokio::sync::watch;

use super::{shutdown_requested, JobHandle};

/// Wait used when the next run time cannot be computed.
const FALLBACK_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
pub struct RetentionMetrics {
    pub runs: AtomicU64,
    pub entries_pruned: AtomicU64,
    pub errors: AtomicU64,
}

impl RetentionMetrics {
    pub fn snapshot(&self) -> RetentionSnapshot {
        RetentionSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            entries_pruned: self.entries_pruned.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionSnapshot {
    pub runs: u64,
    pub entries_pruned: u64,
    pub errors: u64,
}

/// First instant strictly after `now` whose local wall-clock time is
/// `hour:00:00`. Days on which that time does not exist (DST gap) are
/// skipped.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    (0..=2u64).find_map(|offset| {
        let naive = today.checked_add_days(Days::new(offset))?.and_hms_opt(hour, 0, 0)?;
        let at = now.timezone().from_local_datetime(&naive).earliest()?;
        (at > *now).then_some(at)
    })
}

pub struct RetentionJob {
    audit: Arc<dyn AuditTrail>,
    retention_days: u32,
    run_hour: u32,
    metrics: Arc<RetentionMetrics>,
}

impl RetentionJob {
    pub fn new(audit: Arc<dyn AuditTrail>, retention_days: u32, run_hour: u32) -> Self {
        Self {
            audit,
            retention_days,
            run_hour,
            metrics: Arc::new(RetentionMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<RetentionMetrics> {
        self.metrics.clone()
    }

    /// Prune entries older than the horizon, measured from `now`.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> GuildCfgResult<u64> {
        self.metrics.runs.fetch_add(1, Ordering::Relaxed);
        let cutoff = now - chrono::Duration::days(i64::from(self.retention_days));

        match self.audit.prune_before(cutoff).await {
            Ok(deleted) => {
                self.metrics
                    .entries_pruned
                    .fetch_add(deleted, Ordering::Relaxed);
                tracing::info!(
                    deleted,
                    retention_days = self.retention_days,
                    cutoff = %cutoff,
                    "Audit log cleanup completed"
                );
                Ok(deleted)
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Audit log cleanup failed");
                Err(e.into())
            }
        }
    }

    pub async fn tick(&self) -> GuildCfgResult<u64> {
        self.tick_at(Utc::now()).await
    }

    pub fn spawn(self) -> JobHandle<RetentionSnapshot> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            tracing::info!(
                retention_days = self.retention_days,
                run_hour = self.run_hour,
                "Audit retention job started"
            );

            loop {
                let now = Local::now();
                let wait = next_run_after(&now, self.run_hour)
                    .and_then(|next| {
                        tracing::debug!(next_run = %next, "Scheduled audit log cleanup");
                        (next - now).to_std().ok()
                    })
                    .unwrap_or(FALLBACK_WAIT);

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if shutdown_requested(changed, &shutdown_rx) {
                            tracing::info!("Audit retention job shutting down");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {
                        let _ = self.tick().await;
                    }
                }
            }

            self.metrics.snapshot()
        });
        JobHandle::new("retention", shutdown_tx, task)
    }
}
