//! Token types and the per-session token set.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::types::{EndpointId, MessagingHost};

/// The top-level identity credential produced by an auth provider.
///
/// Sent as `X-SkypeToken`, as an `Authorization: skype_token ...` header, or as
/// `Authentication: skypetoken=...` during the registration handshake.
///
/// # Security
///
/// Never logged or displayed in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct PrimaryToken(String);

impl PrimaryToken {
    /// Wrap a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw value for use in request headers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrimaryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrimaryToken").field(&"[REDACTED]").finish()
    }
}

/// The short-lived per-device credential obtained from the registration handshake.
///
/// Holds only the opaque value; the `registrationToken=` prefix is added when
/// the header is built.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationToken(String);

impl RegistrationToken {
    /// Wrap a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of the `RegistrationToken` request header.
    pub fn header_value(&self) -> String {
        format!("registrationToken={}", self.0)
    }
}

impl fmt::Debug for RegistrationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegistrationToken").field(&"[REDACTED]").finish()
    }
}

/// Which half of the token set a call depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// The primary identity token.
    Primary,
    /// The registration token (implies a valid primary token).
    Registration,
}

/// Result of a successful auth provider run.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// The new primary token.
    pub token: PrimaryToken,
    /// Expiry, when the server reported one. `None` means "valid until a call fails".
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthOutcome {
    /// Build an outcome from a token and a relative lifetime in seconds.
    pub fn expiring_in(token: PrimaryToken, seconds: Option<i64>) -> Self {
        Self {
            token,
            expiry: seconds.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// Whether an expiry has passed. `now == expiry` counts as expired.
pub fn is_expired(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expiry
}

/// All credentials held by one session.
///
/// The registration half is only meaningful while the primary half is set and
/// unexpired; [`TokenSet::is_valid`] enforces that.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Account identifier (`live:...`, a username, or `guest:...`).
    pub identity: Option<String>,
    /// Primary token.
    pub primary: Option<PrimaryToken>,
    /// Primary token expiry. `None` with a token set means "never reported".
    pub primary_expiry: Option<DateTime<Utc>>,
    /// Registration token.
    pub registration: Option<RegistrationToken>,
    /// Registration token expiry.
    pub registration_expiry: Option<DateTime<Utc>>,
    /// Messaging host the registration was issued for.
    pub host: MessagingHost,
    /// Endpoint created by the last handshake.
    pub endpoint: Option<EndpointId>,
}

impl TokenSet {
    /// An empty token set targeting the given messaging host.
    pub fn new(host: MessagingHost) -> Self {
        Self {
            identity: None,
            primary: None,
            primary_expiry: None,
            registration: None,
            registration_expiry: None,
            host,
            endpoint: None,
        }
    }

    /// Check a token half against the given instant.
    pub fn is_valid(&self, kind: TokenKind, now: DateTime<Utc>) -> bool {
        let primary_ok = self.primary.is_some()
            && self
                .primary_expiry
                .is_none_or(|expiry| !is_expired(expiry, now));
        match kind {
            TokenKind::Primary => primary_ok,
            TokenKind::Registration => {
                primary_ok
                    && self.registration.is_some()
                    && self
                        .registration_expiry
                        .is_some_and(|expiry| !is_expired(expiry, now))
            }
        }
    }

    /// Check a token half against the current time.
    pub fn is_valid_now(&self, kind: TokenKind) -> bool {
        self.is_valid(kind, Utc::now())
    }

    /// Replace the primary half. The registration half is dropped with it.
    pub fn set_primary(&mut self, outcome: AuthOutcome) {
        self.primary = Some(outcome.token);
        self.primary_expiry = outcome.expiry;
        self.clear_registration();
    }

    /// Replace the registration half.
    pub fn set_registration(
        &mut self,
        token: RegistrationToken,
        expiry: DateTime<Utc>,
        host: MessagingHost,
        endpoint: Option<EndpointId>,
    ) {
        self.registration = Some(token);
        self.registration_expiry = Some(expiry);
        self.host = host;
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
    }

    /// Forget the registration half so the next registration-token call reruns the handshake.
    pub fn clear_registration(&mut self) {
        self.registration = None;
        self.registration_expiry = None;
    }

    /// Whether both halves are present and valid.
    pub fn is_connected(&self) -> bool {
        self.is_valid_now(TokenKind::Registration)
    }

    /// Whether the identity belongs to a guest account.
    pub fn is_guest(&self) -> bool {
        self.identity
            .as_deref()
            .is_some_and(|id| id.starts_with("guest:"))
    }
}
