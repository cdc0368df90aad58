//! Round loop and supervision

use super::pool::{RoundReport, SyncWorkerPool};
use crate::inventory::InventoryApi;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Pause between rounds
pub const DEFAULT_ROUND_INTERVAL: Duration = Duration::from_secs(60);

/// Supervision thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Stop when nothing changed for this long
    pub max_idle: Duration,
    /// Stop when the error counter exceeds this
    pub errors_before_restart: u64,
    pub round_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(120 * 60),
            errors_before_restart: 100,
            round_interval: DEFAULT_ROUND_INTERVAL,
        }
    }
}

/// Why [`SyncService::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Single round requested and done
    Completed,
    /// No change recorded within the idle window
    Idle,
    /// Error counter passed its threshold
    TooManyErrors,
    /// Shutdown signal received
    Shutdown,
}

impl StopReason {
    /// Whether the process should exit non-zero so it gets restarted
    pub fn wants_restart(self) -> bool {
        matches!(self, StopReason::Idle | StopReason::TooManyErrors)
    }
}

/// Lists clusters, hands them to the pool and decides when to stop
pub struct SyncService {
    inventory: Arc<dyn InventoryApi>,
    pool: SyncWorkerPool,
    settings: SupervisorSettings,
    shutdown: watch::Receiver<bool>,
    started: Instant,
}

impl SyncService {
    pub fn new(
        inventory: Arc<dyn InventoryApi>,
        pool: SyncWorkerPool,
        settings: SupervisorSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inventory,
            pool,
            settings,
            shutdown,
            started: Instant::now(),
        }
    }

    pub fn pool(&self) -> &SyncWorkerPool {
        &self.pool
    }

    /// One round over every listed cluster
    pub async fn run_round(&self) -> RoundReport {
        let clusters = match self.inventory.list_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                self.pool.worker().errors().inc();
                error!("Failed to list clusters: {e}");
                return RoundReport::default();
            }
        };
        if clusters.is_empty() {
            warn!("No clusters were found, skipping round");
            return RoundReport::default();
        }

        info!("Syncing {} clusters", clusters.len());
        let report = self.pool.process_clusters(clusters).await;
        info!(
            persisted = report.persisted,
            rejected = report.rejected,
            failed = report.failed,
            cancelled = report.cancelled,
            "Round finished"
        );
        report
    }

    /// Whether the process should stop now
    pub fn verdict(&self) -> Option<StopReason> {
        let worker = self.pool.worker();
        let errors = worker.errors().get();
        if errors > self.settings.errors_before_restart {
            error!(
                "{errors} errors exceed the limit of {}, stopping",
                self.settings.errors_before_restart
            );
            return Some(StopReason::TooManyErrors);
        }

        let idle_since = worker.liveness().last_change().unwrap_or(self.started);
        if idle_since.elapsed() >= self.settings.max_idle {
            error!(
                "No change recorded for {:?}, stopping",
                idle_since.elapsed()
            );
            return Some(StopReason::Idle);
        }
        None
    }

    /// Run rounds until a stop condition.
    ///
    /// With `once` a single round is run and supervision is skipped.
    pub async fn run(&self, once: bool) -> StopReason {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                return StopReason::Shutdown;
            }
            self.run_round().await;
            if once {
                return StopReason::Completed;
            }
            if *shutdown.borrow() {
                return StopReason::Shutdown;
            }
            if let Some(reason) = self.verdict() {
                return reason;
            }

            tokio::select! {
                () = tokio::time::sleep(self.settings.round_interval) => {}
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => {
                        info!("Shutdown requested while waiting for the next round");
                        return StopReason::Shutdown;
                    }
                    Ok(()) => {}
                    // no sender left to signal shutdown
                    Err(_) => tokio::time::sleep(self.settings.round_interval).await,
                }
            }
        }
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
