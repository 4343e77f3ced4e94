//! Security-token exchange flow.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use skyconn_core::error::Error;
use skyconn_core::{AuthOutcome, Credentials, PrimaryToken, Result};

use super::{AuthContext, AuthProvider, PARTNER_ID};
use crate::transport::ApiRequest;

static FAULT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?Fault\b[^>]*>(.*?)</(?:[A-Za-z0-9_]+:)?Fault>")
        .expect("FAULT_REGEX should compile")
});

static FAULT_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?faultcode\b[^>]*>(.*?)</")
        .expect("FAULT_CODE_REGEX should compile")
});

static FAULT_STRING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?faultstring\b[^>]*>(.*?)</")
        .expect("FAULT_STRING_REGEX should compile")
});

static SECURITY_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z0-9_]+:)?BinarySecurityToken\b[^>]*>(.*?)</")
        .expect("SECURITY_TOKEN_REGEX should compile")
});

const ENVELOPE: &str = r#"<Envelope xmlns='http://schemas.xmlsoap.org/soap/envelope/'
   xmlns:wsse='http://schemas.xmlsoap.org/ws/2003/06/secext'
   xmlns:wsp='http://schemas.xmlsoap.org/ws/2002/12/policy'
   xmlns:wsa='http://schemas.xmlsoap.org/ws/2004/03/addressing'
   xmlns:wst='http://schemas.xmlsoap.org/ws/2004/04/trust'
   xmlns:ps='http://schemas.microsoft.com/Passport/SoapServices/PPCRL'>
   <Header>
       <wsse:Security>
           <wsse:UsernameToken Id='user'>
               <wsse:Username>{username}</wsse:Username>
               <wsse:Password>{password}</wsse:Password>
           </wsse:UsernameToken>
       </wsse:Security>
   </Header>
   <Body>
       <ps:RequestMultipleSecurityTokens Id='RSTS'>
           <wst:RequestSecurityToken Id='RST0'>
               <wst:RequestType>http://schemas.xmlsoap.org/ws/2004/04/security/trust/Issue</wst:RequestType>
               <wsp:AppliesTo>
                   <wsa:EndpointReference>
                       <wsa:Address>wl.skype.com</wsa:Address>
                   </wsa:EndpointReference>
               </wsp:AppliesTo>
               <wsse:PolicyReference URI='MBI_SSL'></wsse:PolicyReference>
           </wst:RequestSecurityToken>
       </ps:RequestMultipleSecurityTokens>
   </Body>
</Envelope>"#;

/// Reply from the edge token exchange.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeResponse {
    skypetoken: Option<String>,
    expires_in: Option<i64>,
    status: Option<EdgeStatus>,
}

#[derive(Debug, Deserialize)]
struct EdgeStatus {
    code: Option<serde_json::Value>,
    text: Option<String>,
}

/// Username/password login through the account security-token service.
///
/// Works for accounts with two-factor authentication when given an app
/// password.
#[derive(Debug, Clone)]
pub struct SoapAuth {
    credentials: Credentials,
}

impl SoapAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    async fn security_token(&self, ctx: AuthContext<'_>) -> Result<String> {
        let request = ApiRequest::post(format!("{}/RST.srf", ctx.urls.live))
            .text("text/xml; charset=utf-8", envelope(&self.credentials));
        let response = ctx.transport.send(&request).await?;
        let token = parse_security_token(response.text())?;
        debug!("Security token issued");
        Ok(token)
    }

    async fn exchange(&self, ctx: AuthContext<'_>, security_token: &str) -> Result<AuthOutcome> {
        let request = ApiRequest::post(ctx.urls.edge.clone()).form([
            ("partner", PARTNER_ID),
            ("access_token", security_token),
            ("scopes", "client"),
        ]);
        let reply: EdgeResponse = ctx.transport.send(&request).await?.json()?;

        if let Some(token) = reply.skypetoken {
            return Ok(AuthOutcome::expiring_in(
                PrimaryToken::new(token),
                reply.expires_in,
            ));
        }
        if let Some(status) = reply.status {
            let code = status
                .code
                .map(|c| c.to_string().trim_matches('"').to_string())
                .unwrap_or_default();
            return Err(Error::rejected(format!(
                "{} - {}",
                code,
                status.text.unwrap_or_default()
            )));
        }
        Err(Error::malformed("no skypetoken in edge response"))
    }
}

#[async_trait]
impl AuthProvider for SoapAuth {
    fn name(&self) -> &'static str {
        "soap"
    }

    #[instrument(skip(self, ctx), fields(user = %self.credentials.username()))]
    async fn authenticate(&self, ctx: AuthContext<'_>) -> Result<AuthOutcome> {
        let security_token = self.security_token(ctx).await?;
        let outcome = self.exchange(ctx, &security_token).await?;
        info!("Security token exchanged");
        Ok(outcome)
    }
}

fn envelope(credentials: &Credentials) -> String {
    ENVELOPE
        .replace("{username}", &xml_escape(credentials.username()))
        .replace("{password}", &xml_escape(credentials.password()))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Pull the security token out of the reply, surfacing SOAP faults as rejections.
fn parse_security_token(body: &str) -> Result<String> {
    if let Some(fault) = FAULT_REGEX.captures(body) {
        let inner = &fault[1];
        let code = FAULT_CODE_REGEX.captures(inner).map(|c| c[1].trim().to_string());
        let message = FAULT_STRING_REGEX
            .captures(inner)
            .map(|c| c[1].trim().to_string());
        return match (code, message) {
            (None, None) => Err(Error::malformed("unknown fault while requesting security token")),
            (code, message) => Err(Error::rejected(format!(
                "{} - {}",
                code.unwrap_or_default(),
                message.unwrap_or_default()
            ))),
        };
    }

    SECURITY_TOKEN_REGEX
        .captures(body)
        .map(|c| xml_unescape(c[1].trim()))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::malformed("no security token in login response"))
}
