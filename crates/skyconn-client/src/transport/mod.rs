//! HTTP transport for API calls.

mod request;

pub use request::{ApiRequest, AuthKind, Body, DEFAULT_ACCEPTED};

use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use skyconn_core::error::{AuthError, Error, ProtocolError, TransportError};
use skyconn_core::{Result, TokenSet};

use crate::config::SessionConfig;

/// Headers whose values never reach the logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "x-skypetoken",
    "authorization",
    "registrationtoken",
    "authentication",
    "cookie",
];

/// A received response whose status was in the call's accepted set.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: String,
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// A response header as text, if present and printable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A cookie set by this response.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] when the body does not have the expected shape.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::malformed(format!("unexpected response body ({}): {}", self.status, e))
        })
    }

    /// Decode the body as arbitrary JSON, if it is JSON at all.
    pub fn json_value(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    #[cfg(test)]
    pub(crate) fn for_test(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: body.to_string(),
        }
    }
}

/// HTTP client shared by every call a connection makes.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the config's user agent and default timeout.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client })
    }

    /// Send a call, attaching its auth header from `tokens`.
    pub async fn send_authed(&self, request: &ApiRequest, tokens: &TokenSet) -> Result<ApiResponse> {
        let auth = request.auth.header(tokens)?;
        self.dispatch(request, auth).await
    }

    /// Send a call that carries no token.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.dispatch(request, None).await
    }

    #[instrument(skip(self, request, auth), fields(method = %request.method, url = %request.url))]
    async fn dispatch(
        &self,
        request: &ApiRequest,
        auth: Option<(&'static str, String)>,
    ) -> Result<ApiResponse> {
        debug!("API call");

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((name, value)) = auth {
            builder = builder.header(name, value);
        }
        if !request.cookies.is_empty() {
            let cookie = request
                .cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, cookie);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
            Body::Text { content_type, text } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(text.clone()),
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let built = builder.build().map_err(transport_error)?;
        trace!(headers = ?redacted(built.headers()), "request headers");

        let response = self.client.execute(built).await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response.text().await.map_err(transport_error)?;
        trace!(status, headers = ?redacted(&headers), "API response");

        if request.is_accepted(status) {
            return Ok(ApiResponse {
                status,
                headers,
                cookies,
                body,
            });
        }

        if status == 429 {
            return Err(AuthError::RateLimited.into());
        }

        Err(ProtocolError::new(
            status,
            request.method.as_str(),
            &request.url,
            error_message(&body),
        )
        .into())
    }
}

/// Map a reqwest failure onto the transport taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    let error = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    Error::Transport(error)
}

fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "***".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "errorMessage", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
