//! Messaging host type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};

/// Default messaging host, used until the registration handshake redirects elsewhere.
pub const DEFAULT_MESSAGING_HOST: &str = "https://client-s.gateway.messenger.live.com/v1";

/// A validated messaging API base URL, such as
/// `https://client-s.gateway.messenger.live.com/v1`.
///
/// The service shards accounts across hosts and tells clients which one to use
/// through a `Location` redirect during the registration handshake. Two hosts
/// are equal when their normalized base strings are equal.
///
/// # Example
///
/// ```
/// use skyconn_core::MessagingHost;
///
/// let host = MessagingHost::new("https://bn2-client-s.gateway.messenger.live.com/v1").unwrap();
/// assert_eq!(
///     host.url("users/ME/endpoints"),
///     "https://bn2-client-s.gateway.messenger.live.com/v1/users/ME/endpoints"
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessagingHost(Url);

impl MessagingHost {
    /// Create a host from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not absolute, has no host, or uses plain
    /// HTTP for anything other than a loopback address.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = Url::parse(s).map_err(|e| InvalidInputError::Host {
            value: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&url, s)?;

        // Normalize: drop trailing slashes from the path
        let mut normalized = url;
        let path = normalized.path().trim_end_matches('/').to_string();
        normalized.set_path(&path);
        normalized.set_query(None);
        normalized.set_fragment(None);

        Ok(Self(normalized))
    }

    /// Join a relative API path onto this host.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.as_str(), path.trim_start_matches('/'))
    }

    /// Returns the base URL without a trailing slash.
    pub fn as_str(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    /// Returns the inner URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the host name.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    fn validate(url: &Url, original: &str) -> Result<(), Error> {
        // Must be absolute
        if url.cannot_be_a_base() {
            return Err(InvalidInputError::Host {
                value: original.to_string(),
                reason: "must be an absolute URL".to_string(),
            }
            .into());
        }

        // Must be HTTPS (or HTTP for localhost)
        let scheme = url.scheme();
        let is_localhost = url
            .host_str()
            .is_some_and(|h| h == "localhost" || h == "127.0.0.1" || h == "[::1]");

        if scheme != "https" && !(scheme == "http" && is_localhost) {
            return Err(InvalidInputError::Host {
                value: original.to_string(),
                reason: "must use HTTPS (HTTP allowed only for localhost)".to_string(),
            }
            .into());
        }

        if url.host_str().is_none() {
            return Err(InvalidInputError::Host {
                value: original.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl Default for MessagingHost {
    fn default() -> Self {
        Self(Url::parse(DEFAULT_MESSAGING_HOST).expect("default messaging host is a valid URL"))
    }
}

impl fmt::Display for MessagingHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessagingHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for MessagingHost {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessagingHost {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MessagingHost::new(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for MessagingHost {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
