use clap::{Parser, Subcommand};
use eunio_sync::Collection;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "eunio")]
#[command(about = "Inspect and drive the Eunio offline-first sync layer")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(short, long, env = "EUNIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Treat the network as unavailable; only local data is touched
    #[arg(long)]
    pub offline: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Push dirty local records and reconcile conflicts
    Sync {
        /// Limit the pass to one collection (preferences, settings, daily_logs)
        #[arg(long, value_parser = parse_collection)]
        collection: Option<Collection>,
    },
    /// Count records waiting to be synced
    Status,
    /// Retry a user's daily logs that failed to sync
    Retry {
        #[arg(long)]
        user: String,
    },
    /// Write a versioned settings backup
    Backup {
        #[arg(long)]
        user: String,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore settings from a backup file
    Restore {
        #[arg(long)]
        user: String,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Export settings with customization metadata
    Export {
        #[arg(long)]
        user: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show resolved conflicts for a user's settings
    History {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete every local record of a user; remote data is kept
    Reset {
        #[arg(long)]
        user: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn parse_collection(value: &str) -> Result<Collection, String> {
    Collection::from_str(value).map_err(|e| e.to_string())
}
