//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Playback tape tracker.
///
/// Follows playback sessions on a media server and records where each one
/// skipped and where it played straight through.
#[derive(Debug, Parser)]
#[command(name = "playtape", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Receive webhooks and poll the media server, tracking sessions until interrupted.
    Serve,

    /// Show the regions recorded in a watch log.
    Inspect {
        /// The watch log file.
        path: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Re-derive a watch log's regions from its tape and rewrite it.
    Recompute {
        /// The watch log file.
        path: PathBuf,
    },

    /// Print where the watch log for a media file is kept.
    Path {
        /// The media file, as the media server names it.
        media: String,
    },
}
