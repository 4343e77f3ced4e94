//! Endpoints command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;

use crate::cli::GlobalArgs;
use crate::output;
use crate::session;

#[derive(Args, Debug)]
pub struct EndpointsArgs {
    /// Output as JSON, one endpoint per line
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: EndpointsArgs, global: &GlobalArgs) -> Result<()> {
    let connection = session::resume(global).await?;
    let endpoints = connection
        .refresh_endpoints()
        .await
        .context("Failed to list endpoints")?;
    let current = connection.endpoint().map(|e| e.id().clone());

    for id in &endpoints {
        let is_current = current.as_ref() == Some(id);
        if args.json {
            output::json(&json!({ "id": id.as_str(), "current": is_current }))?;
        } else if is_current {
            println!("{} {}", id, "(this session)".green());
        } else {
            println!("{}", id);
        }
    }

    if endpoints.is_empty() && !args.json {
        eprintln!("{}", "No active endpoints.".dimmed());
    }

    Ok(())
}
