//! Offset types
//!
//! These types are serialized into the offsets index and read back on the
//! next export pass.

use crate::types::compare_order_keys;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Document id segment used for the unpartitioned cursor
pub const UNPARTITIONED: &str = "_none";

/// Deterministic id of the offset document for (stream, partition)
pub fn offset_doc_id(stream: &str, partition: Option<&str>) -> String {
    format!("{stream}-{}", partition.unwrap_or(UNPARTITIONED))
}

/// Position within one partition of a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    /// `None` for an unpartitioned stream or a record without partition value
    pub partition: Option<String>,
    /// Last exported order-key value; `None` before the first export
    pub value: Option<String>,
}

impl Cursor {
    pub fn new(partition: Option<String>, value: impl Into<String>) -> Self {
        Self {
            partition,
            value: Some(value.into()),
        }
    }

    /// Cursor for a partition that has never been exported
    pub fn empty(partition: Option<String>) -> Self {
        Self {
            partition,
            value: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

/// Persisted form of one cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRecord {
    pub stream: String,
    #[serde(default)]
    pub partition: Option<String>,
    pub offset: String,
}

/// All cursors of one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offset {
    stream: String,
    cursors: BTreeMap<Option<String>, String>,
}

impl Offset {
    /// Create an empty offset for a stream
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            cursors: BTreeMap::new(),
        }
    }

    /// Build from persisted records, keeping the greatest value per partition
    pub fn from_records(stream: impl Into<String>, records: impl IntoIterator<Item = OffsetRecord>) -> Self {
        let mut offset = Self::new(stream);
        for record in records {
            offset.advance(record.partition, record.offset);
        }
        offset
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Stored value for a partition
    pub fn get(&self, partition: Option<&str>) -> Option<&str> {
        self.cursors
            .get(&partition.map(str::to_string))
            .map(String::as_str)
    }

    /// Cursor for a partition (empty if unknown)
    pub fn cursor(&self, partition: Option<&str>) -> Cursor {
        Cursor {
            partition: partition.map(str::to_string),
            value: self.get(partition).map(str::to_string),
        }
    }

    /// Move a partition forward.
    ///
    /// The value is kept only if it orders strictly after the current one;
    /// returns whether the offset changed.
    pub fn advance(&mut self, partition: Option<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.cursors.get_mut(&partition) {
            Some(current) => {
                if compare_order_keys(&value, current) == Ordering::Greater {
                    *current = value;
                    true
                } else {
                    false
                }
            }
            None => {
                self.cursors.insert(partition, value);
                true
            }
        }
    }

    /// Apply a cursor; empty cursors are ignored
    pub fn apply(&mut self, cursor: Cursor) -> bool {
        match cursor.value {
            Some(value) => self.advance(cursor.partition, value),
            None => false,
        }
    }

    /// Every known cursor, unpartitioned first
    pub fn cursors(&self) -> impl Iterator<Item = Cursor> + '_ {
        self.cursors
            .iter()
            .map(|(partition, value)| Cursor::new(partition.clone(), value.clone()))
    }

    /// Known non-null partition values
    pub fn partitions(&self) -> Vec<&str> {
        self.cursors.keys().filter_map(|p| p.as_deref()).collect()
    }

    /// Whether a cursor exists for records without a partition value
    pub fn has_unpartitioned(&self) -> bool {
        self.cursors.contains_key(&None)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Persisted form of every cursor
    pub fn to_records(&self) -> Vec<OffsetRecord> {
        self.cursors
            .iter()
            .map(|(partition, value)| OffsetRecord {
                stream: self.stream.clone(),
                partition: partition.clone(),
                offset: value.clone(),
            })
            .collect()
    }
}
