//! Command-line arguments.

use std::path::PathBuf;

use chunkwise_protocol::SpeedTier;
use clap::{Args, Parser, Subcommand};

/// chunkwise - resumable chunked uploads
#[derive(Parser, Debug)]
#[command(name = "chunkwise")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Flags that override values from the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Simulated speed tier (fast, normal, slow, verySlow)
    #[arg(long, global = true)]
    pub speed: Option<SpeedTier>,

    /// Chunk size in bytes for new sessions
    #[arg(long, global = true)]
    pub chunk_size: Option<u64>,

    /// Directory holding session records
    #[arg(long, env = "CHUNKWISE_STORE_DIR", global = true)]
    pub store_dir: Option<PathBuf>,

    /// Probability that a simulated chunk transfer fails
    #[arg(long, global = true)]
    pub failure_rate: Option<f64>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a session for a file and upload it
    Upload {
        /// File to upload
        path: PathBuf,
    },

    /// Continue an interrupted session with its file re-selected
    Resume {
        /// Session id
        id: String,
        /// The same file the session was created for
        path: PathBuf,
    },

    /// Re-send the failed chunks of a session
    Retry {
        /// Session id
        id: String,
        /// The same file the session was created for
        path: PathBuf,
    },

    /// List known sessions
    List,

    /// Show the chunk table summary of one session
    Status {
        /// Session id
        id: String,
    },

    /// Delete a session record
    Delete {
        /// Session id
        id: String,
    },
}
