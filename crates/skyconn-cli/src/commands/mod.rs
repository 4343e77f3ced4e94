//! Subcommand implementations.

mod endpoints;
mod events;
mod guest;
mod login;
mod logout;
mod refresh;
mod whoami;

use anyhow::Result;
use clap::Subcommand;

use crate::cli::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with an account name and password
    Login(login::LoginArgs),

    /// Join a public conversation as a temporary guest
    Guest(guest::GuestArgs),

    /// Display the stored session
    Whoami(whoami::WhoamiArgs),

    /// Renew the primary token and register again
    Refresh(refresh::RefreshArgs),

    /// List the account's active endpoints
    Endpoints(endpoints::EndpointsArgs),

    /// Stream live events
    Events(events::EventsArgs),

    /// Forget the stored session
    Logout(logout::LogoutArgs),
}

pub async fn handle(cmd: Commands, global: &GlobalArgs) -> Result<()> {
    match cmd {
        Commands::Login(args) => login::run(args, global).await,
        Commands::Guest(args) => guest::run(args, global).await,
        Commands::Whoami(args) => whoami::run(args, global).await,
        Commands::Refresh(args) => refresh::run(args, global).await,
        Commands::Endpoints(args) => endpoints::run(args, global).await,
        Commands::Events(args) => events::run(args, global).await,
        Commands::Logout(args) => logout::run(args, global).await,
    }
}
