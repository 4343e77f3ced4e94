//! Error types for skyconn.
//!
//! A single [`Error`] type with explicit variants for transport, authentication,
//! protocol, and input validation failures, so callers can decide whether to
//! re-authenticate, wait, or abort.

use std::fmt;
use thiserror::Error;

/// The unified error type for skyconn operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failures (DNS, TLS, reset, timeout).
    ///
    /// The polling loop retries these silently.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (rejected credentials, rate limits, expiry).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A response status outside the accepted set for the call.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A trusted endpoint returned a shape we do not understand.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// The event subscription on an endpoint is gone and resubscribing did not help.
    #[error("subscription lapsed for endpoint {endpoint}")]
    SubscriptionLapsed { endpoint: String },

    /// Input validation errors (host URL, endpoint id, join code).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// Local I/O failure while reading or writing the session file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Malformed`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::Malformed {
            message: message.into(),
        }
    }

    /// Shorthand for a rejected authentication attempt.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::Auth(AuthError::Rejected {
            reason: reason.into(),
        })
    }

    /// The HTTP status behind this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Protocol(err) => Some(err.status),
            Error::Auth(AuthError::RateLimited) => Some(429),
            Error::SubscriptionLapsed { .. } => Some(404),
            _ => None,
        }
    }

    /// Whether the failure is a connection-level hiccup worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Whether the session can no longer authenticate without caller action.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::Auth(
                AuthError::Rejected { .. }
                    | AuthError::SessionExpired
                    | AuthError::NoCredentials
            )
        )
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Generic HTTP error (body decoding, redirects, builder failures).
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials were refused, or the account needs interactive action.
    ///
    /// Terminal for the provider invocation; retrying with the same
    /// credentials will not help.
    #[error("rejected: {reason}")]
    Rejected { reason: String },

    /// HTTP 429 on an authentication call.
    #[error("rate limit exceeded, back off before retrying")]
    RateLimited,

    /// The primary or registration token is past its expiry.
    #[error("session expired")]
    SessionExpired,

    /// The persisted session could not be parsed.
    #[error("session file is corrupt: {reason}")]
    SessionCorrupt { reason: String },

    /// A token expired and no provider is configured to renew it.
    #[error("token expired and no credentials are available to renew it")]
    NoCredentials,
}

/// A response whose status was not in the accepted set.
#[derive(Debug)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// HTTP method of the failed call.
    pub method: String,
    /// Target URL of the failed call.
    pub url: String,
    /// Error message from the server, if one could be extracted.
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} response from {} {}", self.status, self.method, self.url)?;
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(
        status: u16,
        method: impl Into<String>,
        url: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            method: method.into(),
            url: url.into(),
            message,
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid messaging host URL.
    #[error("invalid host '{value}': {reason}")]
    Host { value: String, reason: String },

    /// Invalid endpoint identifier.
    #[error("invalid endpoint id '{value}': {reason}")]
    EndpointId { value: String, reason: String },

    /// Invalid conversation join code or URL.
    #[error("invalid join code '{value}': {reason}")]
    JoinCode { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
