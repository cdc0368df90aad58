//! Inventory synchronization
//!
//! Pulls clusters, hosts, events, infra envs and component versions from the
//! inventory API and writes them through [`crate::changes::ChangeDetectionStore`].
//!
//! # Overview
//!
//! - `SyncWorker` - processes one cluster end to end
//! - `SyncWorkerPool` - runs workers over a round with bounded concurrency
//! - `SyncService` - repeats rounds and decides when the process should stop

mod cache;
mod checksum;
mod health;
mod normalize;
mod pool;
mod service;
mod worker;

pub use cache::{InfraEnvCache, DEFAULT_CACHE_CAPACITY};
pub use checksum::{
    canonicalize, cluster_state_id, content_hash, event_id, VolatileFields, STATE_ID_FIELD,
};
pub use health::{ErrorCounter, ErrorSink, Liveness};
pub use normalize::{
    anonymize_cluster, cluster_document, event_document, host_document, hosts_summary,
};
pub use pool::{RoundReport, SyncWorkerPool, DEFAULT_WORKERS};
pub use service::{StopReason, SupervisorSettings, SyncService, DEFAULT_ROUND_INTERVAL};
pub use worker::{
    PersistReport, SyncIndices, SyncWorker, WorkItem, WorkOutcome, WorkState, WorkerSettings,
    DEFAULT_MAX_HOSTS, MAX_EVENTS,
};

#[cfg(test)]
mod tests;
