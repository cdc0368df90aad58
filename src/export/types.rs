//! Export types

use crate::output::WrittenObject;
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a source index is partitioned and ordered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Index name in the search store
    pub name: String,
    /// Dotted path of the partition field; unpartitioned when absent
    #[serde(default)]
    pub partition_key: Option<String>,
    /// Dotted path of the order field the cursor tracks
    pub order_key: String,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, order_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: None,
            order_key: order_key.into(),
        }
    }

    /// Set the partition field
    #[must_use]
    pub fn partitioned_by(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn is_partitioned(&self) -> bool {
        self.partition_key.is_some()
    }
}

/// Object layout of an export pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveLayout {
    /// One object per calendar day of the order key
    #[default]
    Daily,
    /// One object per pass
    Batch,
}

/// Values shared by every object key of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContext {
    /// Stream name
    pub stream: String,
    /// Order-key field of the stream
    pub order_key: String,
    /// UTC date of the pass (`YYYY-MM-DD`)
    pub today: String,
    /// Unix seconds at the start of the pass
    pub epoch: i64,
    /// Checksum of the offset the pass started from
    pub checksum: String,
}

/// Maps a record to the key of the archive object it belongs to
pub type KeyFn = Arc<dyn Fn(&KeyContext, &JsonValue) -> String + Send + Sync>;

/// Outcome of one export pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub stream: String,
    /// Records written across all objects
    pub records: usize,
    /// Objects completed
    pub objects: Vec<WrittenObject>,
    /// Offset documents advanced
    pub offsets_saved: usize,
}

impl ExportReport {
    pub fn empty(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Self::default()
        }
    }
}
