//! Guest-join flow.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use skyconn_core::error::Error;
use skyconn_core::{AuthOutcome, GuestInvite, PrimaryToken, Result};

use super::{AuthContext, AuthProvider, BROWSER_USER_AGENT};
use crate::transport::ApiRequest;

/// Validity assumed for guest tokens.
///
/// The server never reports an expiry for guest identities; guest accounts
/// themselves only last about a day, so the token is treated as valid for
/// that long.
pub const GUEST_TOKEN_LIFETIME: Duration = Duration::hours(24);

/// Long-form identifiers of a public conversation.
#[derive(Debug, Deserialize)]
struct ConversationIds {
    #[serde(rename = "Long")]
    long_id: Option<serde_json::Value>,
    #[serde(rename = "Resource")]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestResponse {
    skypetoken: Option<String>,
}

/// Temporary guest identity scoped to one public conversation.
#[derive(Debug, Clone)]
pub struct GuestAuth {
    invite: GuestInvite,
}

impl GuestAuth {
    pub fn new(invite: GuestInvite) -> Self {
        Self { invite }
    }
}

#[async_trait]
impl AuthProvider for GuestAuth {
    fn name(&self) -> &'static str {
        "guest"
    }

    #[instrument(skip(self, ctx), fields(join = %self.invite.short_id()))]
    async fn authenticate(&self, ctx: AuthContext<'_>) -> Result<AuthOutcome> {
        let short_id = self.invite.short_id();

        // The join page only hands out session cookies to browsers it recognises.
        let page = ctx
            .transport
            .send(
                &ApiRequest::get(format!("{}/{}", ctx.urls.join, short_id))
                    .header("User-Agent", BROWSER_USER_AGENT),
            )
            .await?;
        let csrf = page.cookie("csrf_token").unwrap_or_default().to_string();
        let flow_id = page
            .cookie("launcher_session_id")
            .unwrap_or_default()
            .to_string();
        debug!(has_csrf = !csrf.is_empty(), "Join page loaded");

        let ids: ConversationIds = ctx
            .transport
            .send(
                &ApiRequest::post(format!("{}/api/v2/conversation/", ctx.urls.join))
                    .json(json!({ "shortId": short_id, "type": "wl" })),
            )
            .await?
            .json()?;

        let reply: GuestResponse = ctx
            .transport
            .send(
                &ApiRequest::post(format!("{}/api/v1/users/guests", ctx.urls.join))
                    .header("csrf_token", csrf.as_str())
                    .header("X-Skype-Request-Id", flow_id.as_str())
                    .json(json!({
                        "flowId": flow_id,
                        "shortId": short_id,
                        "longId": ids.long_id,
                        "threadId": ids.thread_id,
                        "name": self.invite.display_name(),
                    })),
            )
            .await?
            .json()?;

        let token = reply
            .skypetoken
            .ok_or_else(|| Error::malformed("no skypetoken in guest response"))?;
        info!("Guest identity issued");
        Ok(AuthOutcome {
            token: PrimaryToken::new(token),
            expiry: Some(Utc::now() + GUEST_TOKEN_LIFETIME),
        })
    }
}
