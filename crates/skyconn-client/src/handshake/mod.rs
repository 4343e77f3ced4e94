//! Registration handshake: trade a primary token for a registration token and
//! an endpoint on the right messaging host.

mod hash;

pub use hash::{APP_ID, APP_KEY, lock_and_key_response};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use skyconn_core::error::Error;
use skyconn_core::{EndpointId, MessagingHost, PrimaryToken, RegistrationToken, Result};

use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

static LOCATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?://[^/]+(?:/[^/]+)*?)/users/ME/endpoints(?:/(%7[Bb][A-Za-z0-9\-]+%7[Dd]|\{[A-Za-z0-9\-]+\}))?")
        .expect("LOCATION_REGEX should compile")
});

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)registrationToken=([a-z0-9+/=]+)").expect("TOKEN_REGEX should compile")
});

static EXPIRES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"expires=(\d+)").expect("EXPIRES_REGEX should compile"));

static ENDPOINT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"endpointId=(\{[A-Za-z0-9\-]+\})").expect("ENDPOINT_REGEX should compile")
});

/// What a completed handshake produced.
#[derive(Debug, Clone)]
pub struct Registration {
    pub token: RegistrationToken,
    pub expiry: DateTime<Utc>,
    /// Host the registration belongs to, after any redirects.
    pub host: MessagingHost,
    pub endpoint: EndpointId,
    /// Round trips it took.
    pub rounds: u32,
}

/// Parsed `Set-RegistrationToken` header.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenHeader {
    pub token: RegistrationToken,
    pub expiry: DateTime<Utc>,
    pub endpoint: Option<EndpointId>,
}

/// Parsed `Location` header.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationHeader {
    pub base: String,
    pub endpoint: Option<EndpointId>,
}

/// Drives the endpoint-creation loop until both a registration token and an
/// endpoint id are known.
#[derive(Debug)]
pub struct RegistrationHandshake<'a> {
    transport: &'a HttpTransport,
    max_rounds: u32,
}

impl<'a> RegistrationHandshake<'a> {
    pub fn new(transport: &'a HttpTransport, max_rounds: u32) -> Self {
        Self {
            transport,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Run the handshake starting at `host`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Malformed`] when a registration header cannot be
    /// parsed or the server has not converged after the configured number of
    /// rounds. Statuses other than 200, 201 and 404 propagate as protocol
    /// errors.
    #[instrument(skip(self, primary), fields(start = %host))]
    pub async fn run(&self, primary: &PrimaryToken, host: &MessagingHost) -> Result<Registration> {
        let mut host = host.clone();
        let mut token: Option<(RegistrationToken, DateTime<Utc>)> = None;
        let mut endpoint: Option<EndpointId> = None;

        for round in 1..=self.max_rounds {
            let response = self.attempt(primary, &host).await?;

            if let Some(location) = response.header("Location") {
                let parsed = parse_location(location)?;
                if let Some(id) = parsed.endpoint {
                    endpoint = Some(id);
                }
                let target = MessagingHost::new(&parsed.base)?;
                if target != host {
                    info!(from = %host, to = %target, "Messaging host redirect");
                    host = target;
                    // Anything issued by the old host is discarded.
                    token = None;
                    continue;
                }
            }

            if let Some(header) = response.header("Set-RegistrationToken") {
                let parsed = parse_token_header(header)?;
                token = Some((parsed.token, parsed.expiry));
                if parsed.endpoint.is_some() {
                    endpoint = parsed.endpoint;
                }
            }

            if endpoint.is_none() && response.status() == 200 {
                endpoint = first_listed_endpoint(&response)?;
            }

            match (&token, &endpoint) {
                (Some((value, expiry)), Some(id)) => {
                    info!(round, endpoint = %id, "Registration complete");
                    return Ok(Registration {
                        token: value.clone(),
                        expiry: *expiry,
                        host,
                        endpoint: id.clone(),
                        rounds: round,
                    });
                }
                _ => debug!(
                    round,
                    has_token = token.is_some(),
                    has_endpoint = endpoint.is_some(),
                    "Handshake incomplete, retrying"
                ),
            }
        }

        warn!(rounds = self.max_rounds, "Handshake did not converge");
        Err(Error::malformed(format!(
            "registration handshake did not complete after {} rounds",
            self.max_rounds
        )))
    }

    async fn attempt(&self, primary: &PrimaryToken, host: &MessagingHost) -> Result<ApiResponse> {
        let secs = Utc::now().timestamp();
        let hash = lock_and_key_response(&secs.to_string(), APP_ID, APP_KEY);
        let request = ApiRequest::post(host.url("users/ME/endpoints"))
            .header(
                "LockAndKey",
                format!(
                    "appId={}; time={}; lockAndKeyResponse={}",
                    APP_ID, secs, hash
                ),
            )
            .header("Authentication", format!("skypetoken={}", primary.as_str()))
            .header("BehaviorOverride", "redirectAs404")
            .json(json!({"endpointFeatures": "Agent"}))
            .accept(&[200, 201, 404]);
        self.transport.send(&request).await
    }
}

/// Split a handshake `Location` header into the host base and optional endpoint id.
pub(crate) fn parse_location(value: &str) -> Result<LocationHeader> {
    let captures = LOCATION_REGEX
        .captures(value)
        .ok_or_else(|| Error::malformed(format!("unrecognised Location header: {}", value)))?;
    let base = captures[1].to_string();
    let endpoint = captures
        .get(2)
        .map(|m| EndpointId::new(m.as_str()))
        .transpose()?;
    Ok(LocationHeader { base, endpoint })
}

/// Parse `registrationToken=<v>; expires=<secs>; endpointId=<id>`.
pub(crate) fn parse_token_header(value: &str) -> Result<TokenHeader> {
    let token = TOKEN_REGEX
        .captures(value)
        .map(|c| RegistrationToken::new(&c[1]))
        .ok_or_else(|| Error::malformed("Set-RegistrationToken without a token"))?;
    let expiry = EXPIRES_REGEX
        .captures(value)
        .and_then(|c| c[1].parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| Error::malformed("Set-RegistrationToken without a valid expiry"))?;
    let endpoint = ENDPOINT_REGEX
        .captures(value)
        .map(|c| EndpointId::new(&c[1]))
        .transpose()?;
    Ok(TokenHeader {
        token,
        expiry,
        endpoint,
    })
}

fn first_listed_endpoint(response: &ApiResponse) -> Result<Option<EndpointId>> {
    let Some(Value::Array(list)) = response.json_value() else {
        return Ok(None);
    };
    list.first()
        .and_then(|entry| entry.get("id"))
        .and_then(Value::as_str)
        .map(EndpointId::new)
        .transpose()
}
