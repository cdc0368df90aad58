//! Shared health signals
//!
//! The error counter and the liveness timestamp are read by the sync
//! service between rounds to decide whether the process should stop.

use crate::error::Error;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Count of unexpected per-cluster failures
#[derive(Debug, Default)]
pub struct ErrorCounter {
    value: Mutex<u64>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    pub fn get(&self) -> u64 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Time of the last persisted change
#[derive(Debug, Default)]
pub struct Liveness {
    last_change: Mutex<Option<Instant>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that something was persisted now
    pub fn set_changed(&self) {
        *self.last_change.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn last_change(&self) -> Option<Instant> {
        *self.last_change.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a change was recorded within the last `window`
    pub fn changed_within(&self, window: Duration) -> bool {
        self.last_change()
            .is_some_and(|instant| instant.elapsed() < window)
    }
}

/// External error-tracking sink for unexpected failures
pub trait ErrorSink: Send + Sync {
    fn report(&self, cluster_id: &str, error: &Error);
}
