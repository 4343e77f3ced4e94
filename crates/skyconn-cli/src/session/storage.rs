//! Location and inspection of the session file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use skyconn_core::{FileSessionStore, SessionStore, TokenSet};

/// Get the session file path, creating its directory.
pub fn session_path(overridden: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = overridden {
        return Ok(path.to_path_buf());
    }

    let dirs =
        ProjectDirs::from("", "", "skyconn").context("Could not determine data directory")?;

    let data_dir = dirs.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join("session"))
}

/// Read the stored session without contacting the server.
pub fn load(path: &Path) -> Result<Option<TokenSet>> {
    FileSessionStore::new(path)
        .load()
        .with_context(|| format!("Failed to load session from {}", path.display()))
}
