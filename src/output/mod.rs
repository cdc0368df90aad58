//! Archive output
//!
//! Streams newline-delimited JSON into object storage (S3, GCS, Azure or a
//! local directory).
//!
//! # Overview
//!
//! This module provides:
//! - `ArchiveDestination` - destination URL parsing and object store setup
//! - `NdjsonWriter` - streaming multipart writer for one archive object
//! - Object key helpers for the daily and batch layouts
//! - Retention purge of objects older than a cut-off

mod cloud;

pub use cloud::{
    batch_key, daily_key, sanitize_stream_name, ArchiveDestination, NdjsonWriter, PurgeReport,
    WrittenObject, DEFAULT_UPLOAD_BUFFER_BYTES,
};
