//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Scan timeout in seconds, overriding the configuration
    #[arg(long, global = true)]
    pub scan_timeout: Option<u64>,

    /// BLE adapter index, overriding the configuration
    #[arg(long, global = true)]
    pub adapter: Option<usize>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Scan for node peripherals and list them
    Scan {
        /// Stop scanning after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Print the directory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the interactive shell
    Shell,
    /// Connect to one device, run a single action and disconnect
    Exec {
        /// Peripheral id as printed by `scan`
        #[arg(short, long)]
        device: String,
        #[command(subcommand)]
        action: ExecAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ExecAction {
    /// Set the node clock to the host time
    Sync,
    /// Request the filename listing
    List,
    /// Erase node memory
    Clear,
    /// Switch the node operating mode
    Mode { mode: i64 },
    /// Download a file
    Get {
        name: String,
        /// Write the file here instead of printing hex
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Treat the transfer as complete after this long without data
        #[arg(long)]
        idle_ms: Option<u64>,
    },
}
