//! Request description and auth header selection.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use skyconn_core::error::AuthError;
use skyconn_core::{Result, TokenKind, TokenSet};

/// Statuses treated as success unless a call overrides them.
pub const DEFAULT_ACCEPTED: &[u16] = &[200, 201, 202, 204, 207];

/// Which credential, if any, a call carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// No credential.
    None,
    /// `X-SkypeToken: <primary>`.
    PrimaryToken,
    /// `Authorization: skype_token <primary>`.
    Bearer,
    /// `RegistrationToken: registrationToken=<registration>`.
    Registration,
}

impl AuthKind {
    /// The token half this header depends on.
    pub fn token_kind(&self) -> Option<TokenKind> {
        match self {
            AuthKind::None => None,
            AuthKind::PrimaryToken | AuthKind::Bearer => Some(TokenKind::Primary),
            AuthKind::Registration => Some(TokenKind::Registration),
        }
    }

    /// Build the header for this kind from the current token set.
    pub fn header(&self, tokens: &TokenSet) -> Result<Option<(&'static str, String)>> {
        let header = match self {
            AuthKind::None => None,
            AuthKind::PrimaryToken => {
                let token = tokens.primary.as_ref().ok_or(AuthError::NoCredentials)?;
                Some(("X-SkypeToken", token.as_str().to_string()))
            }
            AuthKind::Bearer => {
                let token = tokens.primary.as_ref().ok_or(AuthError::NoCredentials)?;
                Some(("Authorization", format!("skype_token {}", token.as_str())))
            }
            AuthKind::Registration => {
                let token = tokens
                    .registration
                    .as_ref()
                    .ok_or(AuthError::SessionExpired)?;
                Some(("RegistrationToken", token.header_value()))
            }
        };
        Ok(header)
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Text { content_type: String, text: String },
}

/// One API call, described independently of the HTTP client.
///
/// # Example
///
/// ```
/// use skyconn_client::{ApiRequest, AuthKind};
///
/// let request = ApiRequest::get("https://api.skype.com/users/self/profile")
///     .auth(AuthKind::PrimaryToken)
///     .header("Accept", "application/json; ver=1.0");
/// assert_eq!(request.url(), "https://api.skype.com/users/self/profile");
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) cookies: Vec<(String, String)>,
    pub(crate) body: Body,
    pub(crate) accepted: Vec<u16>,
    pub(crate) auth: AuthKind,
    pub(crate) timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Body::Empty,
            accepted: DEFAULT_ACCEPTED.to_vec(),
            auth: AuthKind::None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Replace all query parameters.
    pub fn with_query(mut self, params: Vec<(String, String)>) -> Self {
        self.query = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Body::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn text(mut self, content_type: impl Into<String>, text: impl Into<String>) -> Self {
        self.body = Body::Text {
            content_type: content_type.into(),
            text: text.into(),
        };
        self
    }

    /// Replace the accepted status set.
    pub fn accept(mut self, statuses: &[u16]) -> Self {
        self.accepted = statuses.to_vec();
        self
    }

    pub fn auth(mut self, kind: AuthKind) -> Self {
        self.auth = kind;
        self
    }

    /// Override the client-wide timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn auth_kind(&self) -> AuthKind {
        self.auth
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_accepted(&self, status: u16) -> bool {
        self.accepted.contains(&status)
    }

    /// Retarget the call at a different URL, dropping its query parameters.
    pub(crate) fn retarget(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self.query.clear();
        self
    }
}
