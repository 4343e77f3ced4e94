//! Session persistence trait.

use crate::Result;
use crate::tokens::TokenSet;

/// Somewhere a [`TokenSet`] can be saved between runs.
pub trait SessionStore: Send + Sync {
    /// Load the saved session.
    ///
    /// Returns `Ok(None)` when nothing has been saved. Fails with
    /// [`AuthError::SessionExpired`](crate::error::AuthError::SessionExpired)
    /// when the primary token is past its expiry, and with
    /// [`AuthError::SessionCorrupt`](crate::error::AuthError::SessionCorrupt)
    /// when the saved data cannot be parsed. A session whose registration half
    /// expired loads with that half cleared.
    fn load(&self) -> Result<Option<TokenSet>>;

    /// Save the session, replacing whatever was there.
    fn save(&self, tokens: &TokenSet) -> Result<()>;

    /// Forget the saved session.
    fn clear(&self) -> Result<()>;
}
