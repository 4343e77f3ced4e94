//! Refresh flow: renew a primary token without credentials.

use async_trait::async_trait;
use tracing::{info, instrument};

use skyconn_core::error::{AuthError, Error};
use skyconn_core::{AuthOutcome, Result};

use super::{AuthContext, AuthProvider, CLIENT_ID, REDIRECT_URI, exchange_t, scrape};
use crate::transport::ApiRequest;

/// Presents the currently held primary token as a cookie and exchanges the
/// resulting `t` value for a renewed token.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshAuth;

impl RefreshAuth {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthProvider for RefreshAuth {
    fn name(&self) -> &'static str {
        "refresh"
    }

    #[instrument(skip(self, ctx))]
    async fn authenticate(&self, ctx: AuthContext<'_>) -> Result<AuthOutcome> {
        let current = ctx.current.ok_or(AuthError::NoCredentials)?;
        let request = ApiRequest::get(format!("{}/login", ctx.urls.login))
            .query("client_id", CLIENT_ID)
            .query("redirect_uri", REDIRECT_URI)
            .cookie("refresh-token", current.as_str());
        let response = ctx.transport.send(&request).await?;

        let page = response.text();
        let t = match scrape::input_by_id(page, "t") {
            Some(t) => t,
            None => {
                let reason = scrape::inline_error(page)
                    .unwrap_or_else(|| "no t field in login response".to_string());
                return Err(Error::rejected(reason));
            }
        };

        let outcome = exchange_t(ctx, &t).await?;
        info!("Primary token refreshed");
        Ok(outcome)
    }
}
