//! RTM CLI Library
//!
//! Command-line interface of the Rucio Transfer Manager.
//!
//! # Overview
//!
//! - **Definition**: Register datasets from the file catalog (`rtm define`)
//! - **Subscription**: Create replication rules (`rtm subscribe`)
//! - **Monitoring**: Poll rule progress and list datasets (`rtm status`)
//! - **Verification**: Checksum transferred files (`rtm verify`)
//! - **Overview**: Per-state totals (`rtm summary`)
//! - **Identity**: Show the Rucio account (`rtm whoami`)

pub mod commands;
pub mod error;
pub mod proxy;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use rtm_common::logging::LogLevel;
use std::path::PathBuf;

/// RTM - keep track of a large number of Rucio transfers
#[derive(Parser, Debug)]
#[command(name = "rtm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Set logging level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/RucioTransferManager/rtm.toml)
    #[arg(short, long, env = "RTM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Skip the VOMS proxy lifetime check
    #[arg(long, global = true)]
    pub no_proxy_check: bool,

    /// Print the command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Define datasets in the database
    Define {
        /// Dataset names
        datasets: Vec<String>,

        /// Destination site (RSE expression)
        #[arg(long)]
        site: Option<String>,

        /// YAML file with `datasets` and `site` keys
        #[arg(long, conflicts_with_all = ["datasets", "site"])]
        file: Option<PathBuf>,
    },

    /// Start transfers by creating replication rules
    Subscribe {
        /// Dataset name glob (all datasets if omitted)
        pattern: Option<String>,
    },

    /// List status of transfers
    Status {
        /// Dataset name glob (all datasets if omitted)
        pattern: Option<String>,

        /// Don't poll the replication service before listing
        #[arg(long)]
        no_update: bool,
    },

    /// Verify the transferred datasets
    Verify {
        /// Dataset name glob (all datasets if omitted)
        pattern: Option<String>,
    },

    /// Summarise the status of all datasets
    Summary,

    /// Effective Rucio client account
    Whoami,

    /// Delete subscription
    Delete,
}

impl Commands {
    /// Whether the command needs a valid grid proxy
    pub fn needs_proxy(&self) -> bool {
        !matches!(self, Commands::Delete)
    }
}
