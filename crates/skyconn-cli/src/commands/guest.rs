//! Guest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use skyconn_core::GuestInvite;

use super::login::print_summary;
use crate::cli::GlobalArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct GuestArgs {
    /// Join URL (https://join.skype.com/...) or bare join code
    pub join: String,

    /// Name shown to other participants
    #[arg(long)]
    pub name: String,
}

pub async fn run(args: GuestArgs, global: &GlobalArgs) -> Result<()> {
    let invite = GuestInvite::new(&args.join, &args.name).context("Invalid join code")?;
    let connection = session::connection(global)?;

    eprintln!("{}", format!("Joining {} as a guest...", invite.short_id()).dimmed());

    connection
        .login_guest(invite)
        .await
        .context("Failed to join as guest")?;

    output::success("Joined as guest");
    println!();
    print_summary(&connection);

    Ok(())
}
