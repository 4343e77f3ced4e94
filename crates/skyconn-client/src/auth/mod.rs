//! Auth providers: every way of obtaining a primary token.

mod guest;
mod live;
mod refresh;
mod scrape;
mod soap;

pub use guest::{GUEST_TOKEN_LIFETIME, GuestAuth};
pub use live::LiveAuth;
pub use refresh::RefreshAuth;
pub use soap::SoapAuth;

use std::fmt;

use async_trait::async_trait;

use skyconn_core::error::Error;
use skyconn_core::{AuthOutcome, PrimaryToken, Result};

use crate::config::ServiceUrls;
use crate::transport::{ApiRequest, HttpTransport};

/// OAuth client id of the web client.
pub const CLIENT_ID: &str = "578134";

/// Redirect target registered for [`CLIENT_ID`].
pub const REDIRECT_URI: &str = "https://web.skype.com";

/// Partner id used by the token exchange endpoints.
pub const PARTNER_ID: &str = "999";

/// Browser user agent for pages that refuse unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/33.0.1750.117 Safari/537.36";

/// Everything a provider may use while authenticating.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext<'a> {
    pub transport: &'a HttpTransport,
    pub urls: &'a ServiceUrls,
    /// The token currently held, if any.
    pub current: Option<&'a PrimaryToken>,
}

/// A source of primary tokens.
///
/// Implementations hold their own credentials, so a connection can rerun the
/// provider whenever the primary token expires.
///
/// # Errors
///
/// [`authenticate`](AuthProvider::authenticate) fails with
/// [`AuthError::Rejected`](skyconn_core::error::AuthError::Rejected) when the
/// credentials are refused (terminal, not retried), with
/// [`Error::Malformed`] when a login page or reply has an unexpected shape,
/// and with `AuthError::RateLimited` on HTTP 429.
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Obtain a fresh primary token.
    async fn authenticate(&self, ctx: AuthContext<'_>) -> Result<AuthOutcome>;
}

/// Exchange a Microsoft account `t` value for a primary token.
pub(crate) async fn exchange_t(ctx: AuthContext<'_>, t: &str) -> Result<AuthOutcome> {
    let request = ApiRequest::post(format!("{}/microsoft", ctx.urls.login))
        .query("client_id", CLIENT_ID)
        .query("redirect_uri", REDIRECT_URI)
        .form([
            ("t", t),
            ("client_id", CLIENT_ID),
            ("oauthPartner", PARTNER_ID),
            ("site_name", "lw.skype.com"),
            ("redirect_uri", REDIRECT_URI),
        ]);
    let response = ctx.transport.send(&request).await?;
    let page = response.text();

    let token = scrape::input_by_name(page, "skypetoken")
        .ok_or_else(|| Error::malformed("no skypetoken field in login response"))?;
    let expires_in = scrape::input_by_name(page, "expires_in")
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| Error::malformed(format!("unparsable expires_in: {}", value)))
        })
        .transpose()?;

    Ok(AuthOutcome::expiring_in(PrimaryToken::new(token), expires_in))
}
