pub mod commands;
pub mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Bounded counter with debounced local and remote persistence")]
pub struct Cli {
    /// Directory holding the local cache
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the remote counter API
    #[arg(long, global = true)]
    pub remote_url: Option<String>,

    /// Never contact the remote
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the current value
    Show,
    /// Increment the counter
    Inc {
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },
    /// Decrement the counter
    Dec {
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },
    /// Set the counter to zero
    Reset,
    /// Print session statistics
    Session,
    /// Write a backup file
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Restore from a backup file
    Import { file: PathBuf },
    /// Reconcile with the remote now
    Sync,
    /// Check whether the remote is reachable
    Health,
}
