//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::commands::Commands;

/// Skype-compatible messaging CLI: sign in, inspect the session, watch events.
#[derive(Parser, Debug)]
#[command(name = "skyconn")]
#[command(author, version = env!("SKYCONN_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options every command shares.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Session file to read and write (defaults to the user data directory)
    #[arg(long, global = true, env = "SKYCONN_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Serve every service from one base URL (for test servers)
    #[arg(long, global = true, env = "SKYCONN_SERVICE_URL", hide = true)]
    pub service_url: Option<String>,
}
