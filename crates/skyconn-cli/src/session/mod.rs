//! Building connections from the stored session.

pub mod storage;

use anyhow::{Context, Result, bail};
use tracing::warn;

use skyconn_client::{Connection, ServiceUrls, SessionConfig};

use crate::cli::GlobalArgs;

/// Shown whenever a command needs a session and none is stored.
pub const NO_SESSION: &str = "No active session. Run 'skyconn login' first.";

fn service_urls(global: &GlobalArgs) -> Result<ServiceUrls> {
    match &global.service_url {
        Some(base) => ServiceUrls::rooted_at(base).context("Invalid service URL"),
        None => Ok(ServiceUrls::default()),
    }
}

/// A connection that reads and writes the session file but has not talked to
/// the server yet.
pub fn connection(global: &GlobalArgs) -> Result<Connection> {
    let path = storage::session_path(global.session_file.as_deref())?;
    let config = SessionConfig::default()
        .session_file(path)
        .prefer_persisted(true);
    Connection::new(service_urls(global)?, config).context("Failed to create client")
}

/// A connection resumed from the session file.
pub async fn resume(global: &GlobalArgs) -> Result<Connection> {
    let connection = connection(global)?;
    let restored = match connection.restore().await {
        Ok(restored) => restored,
        Err(e) => {
            warn!(error = %e, "Stored session could not be restored");
            return Err(e).context("Failed to restore session");
        }
    };
    if !restored {
        bail!(NO_SESSION);
    }
    Ok(connection)
}
