//! CLI module
//!
//! Command-line interface for the sync service and the exporter.
//!
//! # Commands
//!
//! - `sync` - Pull clusters from the inventory API into the search store
//! - `export` - Archive newly arrived documents to object storage
//! - `validate` - Load and check the configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::Runner;
