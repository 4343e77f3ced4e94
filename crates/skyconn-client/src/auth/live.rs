//! Password-form flow through the Microsoft account login pages.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use skyconn_core::error::Error;
use skyconn_core::{AuthOutcome, Credentials, Result};

use super::{AuthContext, AuthProvider, CLIENT_ID, REDIRECT_URI, exchange_t, scrape};
use crate::transport::{ApiRequest, ApiResponse};

const WREPLY: &str = "https://lw.skype.com/login/oauth/proxy?client_id=578134&site_name=lw.skype.com&redirect_uri=https%3A%2F%2Fweb.skype.com%2F";

/// Outcome of inspecting one login page.
#[derive(Debug, PartialEq)]
enum PageCheck {
    /// The page carries the `t` value to exchange.
    Token(String),
    /// Nothing conclusive, carry on with the next stage.
    Continue,
}

/// Username/password login emulating the web client on the account login pages.
///
/// Accounts with two-factor authentication or pending consent screens are
/// rejected; use [`SoapAuth`](super::SoapAuth) with an app password for those.
#[derive(Debug, Clone)]
pub struct LiveAuth {
    credentials: Credentials,
}

impl LiveAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Whether an account exists for a username or email address.
    #[instrument(skip(ctx))]
    pub async fn account_exists(ctx: AuthContext<'_>, username: &str) -> Result<bool> {
        let request = ApiRequest::post(format!("{}/GetCredentialType.srf", ctx.urls.live))
            .json(json!({ "username": username }));
        let body: Value = ctx.transport.send(&request).await?.json()?;
        let missing = body
            .get("IfExistsResult")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(missing == 0)
    }

    async fn fetch_t(&self, ctx: AuthContext<'_>) -> Result<String> {
        // Stage 1: the login form, for the anti-forgery value and session cookies.
        let stage1 = ctx
            .transport
            .send(
                &ApiRequest::get(format!("{}/oauth/microsoft", ctx.urls.login))
                    .query("client_id", CLIENT_ID)
                    .query("redirect_uri", REDIRECT_URI),
            )
            .await?;
        if let PageCheck::Token(t) = check(&stage1)? {
            return Ok(t);
        }
        let ppft = scrape::ppft(stage1.text())
            .ok_or_else(|| Error::malformed("no PPFT field in login form"))?;
        let (Some(requ), Some(ok)) = (stage1.cookie("MSPRequ"), stage1.cookie("MSPOK")) else {
            return Err(Error::malformed("login form did not set MSPRequ/MSPOK cookies"));
        };
        let cookies = [("MSPRequ", requ.to_string()), ("MSPOK", ok.to_string())];
        debug!("Login form loaded");

        // Stage 2: submit the credentials.
        let stage2 = ctx
            .transport
            .send(&self.post_form(ctx, &cookies).form([
                ("login", self.credentials.username()),
                ("passwd", self.credentials.password()),
                ("PPFT", ppft.as_str()),
                ("loginoptions", "3"),
            ]))
            .await?;
        if let PageCheck::Token(t) = check(&stage2)? {
            return Ok(t);
        }
        let opid = scrape::opid(stage2.text())
            .ok_or_else(|| Error::malformed("no opid field in login response"))?;
        debug!("Credentials accepted, continuing with opid");

        // Stage 3: confirm with the continuation id.
        let stage3 = ctx
            .transport
            .send(&self.post_form(ctx, &cookies).form([
                ("opid", opid.as_str()),
                ("PPFT", ppft.as_str()),
                ("site_name", "lw.skype.com"),
                ("oauthPartner", "999"),
                ("client_id", CLIENT_ID),
                ("redirect_uri", REDIRECT_URI),
                ("type", "28"),
            ]))
            .await?;
        match check(&stage3)? {
            PageCheck::Token(t) => Ok(t),
            PageCheck::Continue => Err(Error::malformed("no t field in login response")),
        }
    }

    fn post_form(&self, ctx: AuthContext<'_>, cookies: &[(&str, String)]) -> ApiRequest {
        let mut request = ApiRequest::post(format!("{}/ppsecure/post.srf", ctx.urls.live))
            .query("wa", "wsignin1.0")
            .query("wp", "MBI_SSL")
            .query("wreply", WREPLY);
        for (name, value) in cookies {
            request = request.cookie(*name, value.as_str());
        }
        request.cookie("CkTst", format!("G{}", Utc::now().timestamp_millis()))
    }
}

#[async_trait]
impl AuthProvider for LiveAuth {
    fn name(&self) -> &'static str {
        "live"
    }

    #[instrument(skip(self, ctx), fields(user = %self.credentials.username()))]
    async fn authenticate(&self, ctx: AuthContext<'_>) -> Result<AuthOutcome> {
        let t = self.fetch_t(ctx).await?;
        let outcome = exchange_t(ctx, &t).await?;
        info!("Password login succeeded");
        Ok(outcome)
    }
}

/// Look for the markers every login page may carry, in priority order.
fn check(response: &ApiResponse) -> Result<PageCheck> {
    let page = response.text();
    if let Some(t) = scrape::input_by_id(page, "t") {
        return Ok(PageCheck::Token(t));
    }
    if let Some(message) = scrape::inline_error(page) {
        return Err(Error::rejected(message));
    }
    if scrape::has_two_factor_prompt(page) {
        return Err(Error::rejected("two-factor authentication is not supported"));
    }
    if let Some(action) = scrape::consent_form_action(page) {
        return Err(Error::rejected(format!(
            "account action required ({}), sign in with a web browser first",
            action
        )));
    }
    Ok(PageCheck::Continue)
}
