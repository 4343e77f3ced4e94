//! Refresh command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::login::print_summary;
use crate::cli::GlobalArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct RefreshArgs {}

pub async fn run(_args: RefreshArgs, global: &GlobalArgs) -> Result<()> {
    let connection = session::resume(global).await?;

    eprintln!("{}", "Refreshing session...".dimmed());

    connection
        .refresh_primary_token()
        .await
        .context("Failed to refresh session")?;

    output::success("Session refreshed successfully");
    print_summary(&connection);

    Ok(())
}
