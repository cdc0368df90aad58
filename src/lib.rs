// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # cluster-events-sync
//!
//! Keeps a search store in step with an inventory service, and archives what
//! arrives in the search store to object storage.
//!
//! ## Features
//!
//! - **Cluster sync**: bounded worker pool pulling clusters, hosts, events,
//!   infra envs and component versions from the inventory API
//! - **Change detection**: only documents whose identity is not yet stored
//!   are written; cluster identities ignore volatile fields
//! - **Incremental export**: per-partition offsets, NDJSON objects grouped by
//!   day, offsets advanced only after every object is complete
//! - **Object storage**: S3, GCS, Azure or a local directory
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cluster_events_sync::export::{IncrementalExporter, StreamDescriptor};
//! use cluster_events_sync::output::ArchiveDestination;
//! use cluster_events_sync::state::OffsetStore;
//!
//! let offsets = OffsetStore::new(store.clone(), ".export_offsets");
//! let destination = ArchiveDestination::parse("s3://archive/events")?;
//! let exporter = IncrementalExporter::new(store, offsets, destination);
//!
//! let events = StreamDescriptor::new(".events", "event_time").partitioned_by("cluster_id");
//! let report = exporter.export_stream(&events).await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────────┐   ┌──────────────┐
//! │ Inventory API│──▶│ sync: worker pool, checksums │──▶│              │
//! └──────────────┘   └──────────────────────────────┘   │ Search store │
//!                    ┌──────────────────────────────┐   │ (OpenSearch) │
//! ┌──────────────┐   │ export: offsets, NDJSON      │◀──│              │
//! │ Object store │◀──│ writers per day / per pass   │   └──────────────┘
//! └──────────────┘   └──────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Retry with backoff and jitter
pub mod retry;

/// Authentication implementations
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Inventory API client
pub mod inventory;

/// Search store access
pub mod store;

/// Idempotent change-detecting writes
pub mod changes;

/// Export offsets
pub mod state;

/// Archive object output
pub mod output;

/// Incremental export
pub mod export;

/// Inventory synchronization
pub mod sync;

/// Application configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
