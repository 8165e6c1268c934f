//! Command-line interface.

mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::demo::{run_config_command, run_demo_command, run_status_command};

#[derive(Parser, Debug)]
#[command(
    name = "wallet-session",
    version,
    about = "Wallet session walkthrough against an in-process development chain"
)]
pub struct Cli {
    /// TOML config file (errors are fatal when given explicitly).
    #[arg(long, global = true, env = "WALLET_SESSION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect, show status, deploy, write, sign a message, disconnect.
    Demo {
        /// The wallet declines the authorization prompt.
        #[arg(long)]
        reject: bool,

        /// Run the development chain on this chain id.
        #[arg(long)]
        chain_id: Option<u64>,

        /// Empty blocks to mine after connecting.
        #[arg(long, default_value_t = 2)]
        blocks: u64,

        /// Value written to the contract after deploying it.
        #[arg(long, default_value = "New greeting")]
        new_value: String,
    },

    /// Connect and print one status line per block.
    Status {
        #[arg(long, default_value_t = 3)]
        blocks: u64,
    },

    /// Print the resolved configuration.
    Config,
}
