//! Shared mock-server fixtures for the client integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skyconn_client::{AuthContext, AuthProvider, Connection, ServiceUrls, SessionConfig};
use skyconn_core::{AuthOutcome, PrimaryToken, Result};

/// Endpoint id handed out by the mock handshake.
pub const ENDPOINT_ID: &str = "{8f2c1a3e-11aa-4c0b-9a1e-2a0d4b6c7e81}";

/// Registration token handed out by the mock handshake.
pub const REGISTRATION_TOKEN: &str = "U2lnbmF0dXJlOjE3MDA=";

/// Path pattern for calls on any endpoint, followed by `suffix`.
pub fn endpoint_path(suffix: &str) -> String {
    format!(r"^/v1/users/ME/endpoints/[^/]+/{}$", suffix)
}

pub fn urls(server: &MockServer) -> ServiceUrls {
    ServiceUrls::rooted_at(&server.uri()).unwrap()
}

pub fn config() -> SessionConfig {
    SessionConfig::default()
        .request_timeout(Duration::from_secs(5))
        .poll_timeout(Duration::from_secs(5))
        .prefer_persisted(false)
}

pub fn connection(server: &MockServer) -> Connection {
    Connection::new(urls(server), config()).unwrap()
}

/// `Set-RegistrationToken` value valid for a day.
pub fn registration_header(endpoint: Option<&str>) -> String {
    let expires = (Utc::now() + chrono::Duration::hours(24)).timestamp();
    let mut value = format!("registrationToken={}; expires={}", REGISTRATION_TOKEN, expires);
    if let Some(id) = endpoint {
        value.push_str(&format!("; endpointId={}", id));
    }
    value
}

pub async fn mount_profile(server: &MockServer, username: &str) {
    Mock::given(method("GET"))
        .and(path("/api/users/self/profile"))
        .and(header_exists("X-SkypeToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": username,
            "firstname": "Test",
        })))
        .mount(server)
        .await;
}

/// Handshake that succeeds on the first round.
pub async fn mount_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/users/ME/endpoints"))
        .and(header_exists("LockAndKey"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Set-RegistrationToken", registration_header(Some(ENDPOINT_ID))),
        )
        .mount(server)
        .await;
}

/// Presence document and endpoint listing for a freshly registered endpoint.
pub async fn mount_endpoint_setup(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path_regex(endpoint_path("presenceDocs/messagingService")))
        .and(header(
            "RegistrationToken",
            format!("registrationToken={}", REGISTRATION_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/users/ME/presenceDocs/messagingService"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "endpointPresenceDocs": [
                {
                    "link": format!(
                        "{}/v1/users/ME/endpoints/%7B8f2c1a3e-11aa-4c0b-9a1e-2a0d4b6c7e81%7D/presenceDocs/messagingService",
                        server.uri()
                    ),
                },
                {
                    "link": format!(
                        "{}/v1/users/ME/endpoints/%7B0b7e2c1a-0c2f-4b8e-9d8a-3f7c2e9b1a44%7D/presenceDocs/messagingService",
                        server.uri()
                    ),
                },
            ]
        })))
        .mount(server)
        .await;
}

/// Everything a login needs after the provider has produced a token.
pub async fn mount_registration(server: &MockServer, username: &str) {
    mount_profile(server, username).await;
    mount_handshake(server).await;
    mount_endpoint_setup(server).await;
}

/// Provider handing out `primary-<n>` tokens and counting its runs.
#[derive(Debug, Clone, Default)]
pub struct CountingProvider {
    calls: Arc<AtomicUsize>,
    expire_first: bool,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first token expires the moment it is issued.
    pub fn expiring_first() -> Self {
        Self {
            expire_first: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn authenticate(&self, _ctx: AuthContext<'_>) -> Result<AuthOutcome> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let expiry = if self.expire_first && n == 1 {
            now
        } else {
            now + chrono::Duration::hours(1)
        };
        Ok(AuthOutcome {
            token: PrimaryToken::new(format!("primary-{}", n)),
            expiry: Some(expiry),
        })
    }
}
