//! Six-line session file.
//!
//! Layout, one field per line:
//!
//! ```text
//! identity
//! primary token
//! primary expiry (unix seconds, 0 when the server never reported one)
//! registration token (empty when absent)
//! registration expiry (unix seconds, 0 when absent)
//! messaging host
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::Result;
use crate::error::{AuthError, Error};
use crate::tokens::{PrimaryToken, RegistrationToken, TokenSet, is_expired};
use crate::traits::SessionStore;
use crate::types::MessagingHost;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const FIELD_COUNT: usize = 6;

/// A [`SessionStore`] backed by a single owner-readable file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store the session at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_at(&self, now: DateTime<Utc>) -> Result<Option<TokenSet>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut tokens = decode(&contents)?;
        match tokens.primary_expiry {
            Some(expiry) if is_expired(expiry, now) => {
                debug!(path = %self.path.display(), "Persisted primary token has expired");
                return Err(AuthError::SessionExpired.into());
            }
            _ => {}
        }

        if tokens
            .registration_expiry
            .is_some_and(|expiry| is_expired(expiry, now))
        {
            debug!("Persisted registration token has expired, handshake must be rerun");
            tokens.clear_registration();
        }

        Ok(Some(tokens))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<TokenSet>> {
        self.load_at(Utc::now())
    }

    fn save(&self, tokens: &TokenSet) -> Result<()> {
        let encoded = encode(tokens);
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Written next to the target and renamed over it.
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(encoded.as_bytes())?;
        file.as_file().sync_all()?;

        #[cfg(unix)]
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;

        file.persist(&self.path).map_err(|e| e.error)?;
        info!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn encode(tokens: &TokenSet) -> String {
    let fields = [
        tokens.identity.clone().unwrap_or_default(),
        tokens
            .primary
            .as_ref()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        unix_seconds(tokens.primary_expiry).to_string(),
        tokens
            .registration
            .as_ref()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        unix_seconds(tokens.registration_expiry).to_string(),
        tokens.host.as_str().to_string(),
    ];

    let mut out = String::new();
    for field in fields {
        out.push_str(&field);
        out.push('\n');
    }
    out
}

fn decode(contents: &str) -> Result<TokenSet> {
    let fields: Vec<&str> = contents.lines().collect();
    if fields.len() != FIELD_COUNT {
        return Err(corrupt(format!(
            "expected {} lines, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let primary = fields[1];
    if primary.is_empty() {
        return Err(corrupt("primary token is empty"));
    }
    let primary_expiry = parse_expiry(fields[2], "primary expiry")?;
    let registration_expiry = parse_expiry(fields[4], "registration expiry")?;
    let host = MessagingHost::new(fields[5]).map_err(|e| corrupt(e.to_string()))?;

    let mut tokens = TokenSet::new(host);
    tokens.identity = Some(fields[0].to_string()).filter(|id| !id.is_empty());
    tokens.primary = Some(PrimaryToken::new(primary));
    // A zero expiry was written for a token whose lifetime was never reported,
    // and reads back as long past.
    tokens.primary_expiry = Some(primary_expiry);
    if !fields[3].is_empty() {
        tokens.registration = Some(RegistrationToken::new(fields[3]));
        tokens.registration_expiry = Some(registration_expiry);
    }
    Ok(tokens)
}

fn parse_expiry(field: &str, what: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = field
        .trim()
        .parse()
        .map_err(|_| corrupt(format!("{} is not an integer: {:?}", what, field)))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| corrupt(format!("{} is out of range: {}", what, secs)))
}

fn unix_seconds(expiry: Option<DateTime<Utc>>) -> i64 {
    expiry.map(|e| e.timestamp()).unwrap_or(0)
}

fn corrupt(reason: impl Into<String>) -> Error {
    AuthError::SessionCorrupt {
        reason: reason.into(),
    }
    .into()
}
