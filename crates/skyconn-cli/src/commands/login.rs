//! Login command implementation.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;

use skyconn_client::{Connection, LiveAuth, SoapAuth};
use skyconn_core::Credentials;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session;

/// Which account flow to sign in with.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// SOAP for email addresses, the Live form otherwise
    Auto,
    /// Microsoft account web form
    Live,
    /// Microsoft account SOAP endpoint
    Soap,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Skype username or Microsoft account email
    #[arg(long)]
    pub username: String,

    /// Account password
    #[arg(long, env = "SKYCONN_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Authentication flow
    #[arg(long, value_enum, default_value_t = Method::Auto)]
    pub method: Method,
}

pub async fn run(args: LoginArgs, global: &GlobalArgs) -> Result<()> {
    let credentials = Credentials::new(&args.username, &args.password);
    let connection = session::connection(global)?;

    eprintln!("{}", "Logging in...".dimmed());

    let result = match args.method {
        Method::Auto => connection.login_password(credentials).await,
        Method::Live => connection.login(LiveAuth::new(credentials)).await,
        Method::Soap => connection.login(SoapAuth::new(credentials)).await,
    };
    result.context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    print_summary(&connection);

    Ok(())
}

/// Identity, host and endpoint of a freshly connected session.
pub fn print_summary(connection: &Connection) {
    let tokens = connection.tokens();
    output::field("Identity", tokens.identity.as_deref().unwrap_or("unknown"));
    output::field("Host", tokens.host.as_str());
    if let Some(endpoint) = connection.endpoint() {
        output::field("Endpoint", endpoint.id().as_str());
    }
    output::expiry("Expires", tokens.primary_expiry);
}
