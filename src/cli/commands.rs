//! CLI commands and argument parsing

use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cluster event sync and archive export
#[derive(Parser, Debug)]
#[command(name = "cluster-events-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML); environment variables override it
    #[arg(short, long, global = true, env = "CLUSTER_EVENTS_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Sync clusters, hosts and events into the search store
    Sync {
        /// Run a single round and exit
        #[arg(long)]
        once: bool,
    },

    /// Export new documents to the archive
    Export {
        /// Stream to export (repeatable, empty = all configured)
        #[arg(long = "stream", value_name = "NAME")]
        streams: Vec<String>,

        /// Write one object per stream and pass instead of one per day
        #[arg(long)]
        batch: bool,
    },

    /// Delete archive objects last modified before a cut-off
    Purge {
        /// Cut-off, `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339; defaults to now
        #[arg(long, env = "DELETE_UNTIL_DATE")]
        until: Option<String>,

        /// Only report what would be deleted (`DRYRUN=0` turns it off)
        #[arg(long, env = "DRYRUN", value_parser = FalseyValueParser::new())]
        dry_run: bool,
    },

    /// Validate the configuration
    Validate,
}
