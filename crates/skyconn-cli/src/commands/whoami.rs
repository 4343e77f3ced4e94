//! Whoami command implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session::{self, storage};

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// What `whoami --json` prints. Tokens never leave the session file.
#[derive(Debug, Serialize)]
struct SessionSummary {
    identity: Option<String>,
    guest: bool,
    host: String,
    primary_expiry: Option<DateTime<Utc>>,
    registered: bool,
    registration_expiry: Option<DateTime<Utc>>,
}

pub async fn run(args: WhoamiArgs, global: &GlobalArgs) -> Result<()> {
    let path = storage::session_path(global.session_file.as_deref())?;
    let tokens = storage::load(&path)?.context(session::NO_SESSION)?;

    let summary = SessionSummary {
        identity: tokens.identity.clone(),
        guest: tokens.is_guest(),
        host: tokens.host.to_string(),
        primary_expiry: tokens.primary_expiry,
        registered: tokens.registration.is_some(),
        registration_expiry: tokens.registration_expiry,
    };

    if args.json {
        return output::json_pretty(&summary);
    }

    output::field("Identity", summary.identity.as_deref().unwrap_or("unknown"));
    if summary.guest {
        output::field("Account", "guest");
    }
    output::field("Host", &summary.host);
    output::expiry("Primary token", summary.primary_expiry);
    if summary.registered {
        output::expiry("Registration", summary.registration_expiry);
    } else {
        output::field("Registration", "none");
    }

    Ok(())
}
