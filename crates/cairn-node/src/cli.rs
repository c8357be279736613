//! Command-line surface.

use std::path::PathBuf;

use cairn_engine::EngineConfig;
use cairn_shared::PeerId;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(version, about = "Content-addressed file store with tiered persistence")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides applied on top of the `CAIRN_*` environment.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Data directory for the durable tiers
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Identity of this peer
    #[arg(long, global = true)]
    pub peer_id: Option<String>,

    /// Largest blob the flat tier accepts, in bytes
    #[arg(long, global = true)]
    pub flat_max_blob: Option<usize>,

    /// Volatile cache budget, in bytes
    #[arg(long, global = true)]
    pub cache_max_bytes: Option<usize>,
}

impl GlobalArgs {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(id) = &self.peer_id {
            config.peer_id = Some(PeerId::new(id.trim()));
        }
        if let Some(bytes) = self.flat_max_blob {
            config.flat_max_blob = bytes;
        }
        if let Some(bytes) = self.cache_max_bytes {
            config.cache_max_bytes = bytes;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a file
    Add {
        path: PathBuf,

        /// Stored name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "application/octet-stream")]
        mime: String,

        /// Advertise for network-wide discovery
        #[arg(long)]
        indexed: bool,

        /// Encrypt with this passphrase before storing
        #[arg(long)]
        passphrase: Option<String>,
    },
    /// Read a file back
    Get {
        content_id: String,

        /// Write here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long)]
        passphrase: Option<String>,
    },
    /// List every record
    Ls,
    /// Search by name or content id
    Search { query: String },
    /// Delete a file
    Rm { content_id: String },
    /// Show capacity, usage and monthly cost
    Quota,
    /// Set the total capacity in GB
    SetCapacity { gb: f64 },
    /// Toggle discovery for a record
    SetIndexed {
        content_id: String,
        #[arg(action = clap::ArgAction::Set)]
        indexed: bool,
    },
    /// Run a recovery sweep
    Verify,
    /// Show record and tier counters
    Stats,
    /// Keep the engine open and track peer liveness until Ctrl+C
    Serve,
}
