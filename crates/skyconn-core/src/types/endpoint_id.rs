//! Endpoint identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// Alias the messaging service accepts for "the endpoint making this call".
pub const SELF_ENDPOINT: &str = "SELF";

/// Identifier of a registered endpoint, e.g. `{0b7e2c1a-0c2f-4b8e-9d8a-3f7c2e9b1a44}`.
///
/// The braces are part of the identifier. In URLs the service sometimes sends
/// them percent-encoded (`%7B...%7D`); [`EndpointId::new`] accepts both forms
/// and stores the decoded one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    /// Create an endpoint id, decoding percent-encoded braces.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let raw = s.as_ref();
        let decoded = raw
            .replace("%7B", "{")
            .replace("%7b", "{")
            .replace("%7D", "}")
            .replace("%7d", "}");

        if decoded.is_empty() {
            return Err(InvalidInputError::EndpointId {
                value: raw.to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if decoded
            .chars()
            .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
        {
            return Err(InvalidInputError::EndpointId {
                value: raw.to_string(),
                reason: "must be a single path segment".to_string(),
            }
            .into());
        }

        Ok(Self(decoded))
    }

    /// The `SELF` alias.
    pub fn self_alias() -> Self {
        Self(SELF_ENDPOINT.to_string())
    }

    /// Returns the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `SELF` alias rather than a concrete endpoint.
    pub fn is_self_alias(&self) -> bool {
        self.0 == SELF_ENDPOINT
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EndpointId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for EndpointId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EndpointId::new(&s).map_err(serde::de::Error::custom)
    }
}
