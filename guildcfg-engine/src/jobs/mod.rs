//! Background Jobs
//!
//! Scheduled tasks that run independently of request traffic:
//!
//! - `reconcile_job`: periodic cache repair for the active tenant set
//! - `retention`: daily audit log pruning
//!
//! Each job owns its lifecycle. `spawn` starts the timer loop and returns a
//! [`JobHandle`]; `tick` runs exactly one iteration so tests never wait on
//! wall-clock intervals. A job awaits each tick before waiting for the next,
//! so runs of the same job never overlap.
//!
//! # Usage
//!
//! ```ignore
//! let handle = ReconcileJob::new(reconciler, directory, config.reconcile_interval).spawn();
//!
//! // On shutdown
//! let final_metrics = handle.stop().await;
//! ```

pub mod reconcile_job;
pub mod retention;

pub use reconcile_job::{ReconcileJob, ReconcileMetrics, ReconcileSnapshot};
pub use retention::{next_run_after, RetentionJob, RetentionMetrics, RetentionSnapshot};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a spawned job. Dropping the handle also stops the job.
pub struct JobHandle<S> {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<S>,
}

impl<S> JobHandle<S> {
    pub(crate) fn new(
        name: &'static str,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<S>,
    ) -> Self {
        Self {
            name,
            shutdown_tx,
            task,
        }
    }

    /// Signal shutdown and wait for the loop to exit. An in-flight tick is
    /// allowed to finish first. Returns the job's final metrics.
    pub async fn stop(self) -> Option<S> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::error!(job = self.name, error = %e, "Background job panicked");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// True once shutdown was requested or the sender is gone.
pub(crate) fn shutdown_requested(
    changed: Result<(), watch::error::RecvError>,
    rx: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *rx.borrow()
}
