//! Export offset tracking
//!
//! Keeps the per-stream, per-partition high-water mark the exporter resumes
//! from. Offsets are stored as documents in the search store, one per
//! (stream, partition), so they survive restarts and can be inspected next
//! to the data they describe.
//!
//! # Overview
//!
//! - `Cursor` - position of a single partition
//! - `Offset` - every cursor of one stream, advanced monotonically
//! - `OffsetStore` - loads and saves offsets through a [`crate::store::SearchStore`]

mod manager;
mod types;

pub use manager::{OffsetStore, DEFAULT_OFFSET_INDEX};
pub use types::{offset_doc_id, Cursor, Offset, OffsetRecord, UNPARTITIONED};
