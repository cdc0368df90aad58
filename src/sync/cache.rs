//! Infra-environment cache shared by all workers
//!
//! Infra environments change rarely and many clusters reference the same
//! one, so lookups go through a bounded in-process map that outlives a
//! single round. Concurrent misses for the same id may both fetch; the last
//! insert wins.

use crate::error::Result;
use crate::inventory::{InfraEnvRecord, InventoryApi};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Entries kept unless configured otherwise
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Entries {
    records: HashMap<String, InfraEnvRecord>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

/// Bounded FIFO cache of infra-environment records keyed by id
#[derive(Debug)]
pub struct InfraEnvCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl Default for InfraEnvCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl InfraEnvCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &str) -> Option<InfraEnvRecord> {
        self.lock().records.get(id).cloned()
    }

    /// Insert or replace, evicting the oldest entry when full
    pub fn insert(&self, record: InfraEnvRecord) {
        let mut entries = self.lock();
        let id = record.id.clone();
        if entries.records.insert(id.clone(), record).is_none() {
            entries.order.push_back(id);
            while entries.order.len() > self.capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.records.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached record, fetching it on a miss.
    ///
    /// The lock is not held while fetching. Fetch errors are returned
    /// unchanged and nothing is cached.
    pub async fn get_or_fetch(
        &self,
        id: &str,
        inventory: &dyn InventoryApi,
    ) -> Result<InfraEnvRecord> {
        if let Some(record) = self.get(id) {
            return Ok(record);
        }
        debug!(infra_env_id = id, "Infra env cache miss");
        let record = inventory.get_infra_env(id).await?;
        self.insert(record.clone());
        Ok(record)
    }
}
