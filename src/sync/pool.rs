//! Bounded worker pool for one sync round

use super::worker::{SyncWorker, WorkOutcome};
use crate::inventory::ClusterRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 5;

/// Tally of one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub submitted: usize,
    pub persisted: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Queued clusters dropped by a shutdown
    pub cancelled: usize,
}

impl RoundReport {
    fn record(&mut self, outcome: &WorkOutcome) {
        match outcome {
            WorkOutcome::Persisted { .. } => self.persisted += 1,
            WorkOutcome::Rejected { .. } => self.rejected += 1,
            WorkOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Clusters that reached a terminal state
    pub fn completed(&self) -> usize {
        self.persisted + self.rejected + self.failed
    }
}

/// Runs [`SyncWorker`] over a batch of clusters with at most `n_workers`
/// in flight.
///
/// A shutdown signal cancels clusters still queued; in-flight clusters run
/// to completion.
pub struct SyncWorkerPool {
    worker: Arc<SyncWorker>,
    n_workers: usize,
    shutdown: watch::Receiver<bool>,
}

impl SyncWorkerPool {
    /// `n_workers` is clamped to at least one
    pub fn new(worker: Arc<SyncWorker>, n_workers: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            worker,
            n_workers: n_workers.max(1),
            shutdown,
        }
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    pub fn worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    /// Process every cluster once and wait for all of them.
    ///
    /// Each cluster runs as its own task and its outcome is recorded as soon
    /// as it completes; a panicking task costs only its own cluster.
    pub async fn process_clusters(&self, clusters: Vec<ClusterRecord>) -> RoundReport {
        let mut report = RoundReport {
            submitted: clusters.len(),
            ..RoundReport::default()
        };
        if clusters.is_empty() {
            return report;
        }

        let mut pending: VecDeque<ClusterRecord> = clusters.into();
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            report.cancelled = pending.len();
            warn!("Shutdown requested, {} clusters not processed", report.cancelled);
            return report;
        }
        debug!(
            "Processing {} clusters with {} workers",
            report.submitted,
            self.n_workers.min(report.submitted)
        );

        let mut tasks = JoinSet::new();
        let mut shutdown_seen = false;
        loop {
            while tasks.len() < self.n_workers {
                let Some(cluster) = pending.pop_front() else {
                    break;
                };
                let worker = Arc::clone(&self.worker);
                tasks.spawn(async move { worker.store_events_for_cluster(cluster).await });
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => report.record(&outcome),
                    Some(Err(e)) => {
                        report.failed += 1;
                        self.worker.errors().inc();
                        error!("Sync task failed: {e}");
                    }
                    None => break,
                },
                changed = shutdown.changed(), if !shutdown_seen => {
                    // a dropped sender can never signal again
                    shutdown_seen = changed.is_err() || *shutdown.borrow();
                    if changed.is_ok() && *shutdown.borrow() {
                        report.cancelled = pending.len();
                        pending.clear();
                        info!(
                            "Shutdown requested, cancelled {} queued clusters; waiting for in-flight work",
                            report.cancelled
                        );
                    }
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for SyncWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorkerPool")
            .field("n_workers", &self.n_workers)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}
