//! A registered endpoint: presence, subscription and long polling.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument};

use skyconn_core::{EndpointId, EventBatch, MessagingHost, Result};

use crate::transport::{ApiRequest, ApiResponse, AuthKind};

/// Resources every new subscription listens to.
pub const DEFAULT_INTERESTS: [&str; 3] = [
    "/v1/users/ME/conversations/ALL/properties",
    "/v1/users/ME/conversations/ALL/messages",
    "/v1/threads/ALL",
];

/// Liveness window requested by [`Endpoint::ping`] when the caller has no preference.
pub const DEFAULT_PING_TIMEOUT: u32 = 12;

/// Something that can make authenticated API calls.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Lifecycle of an endpoint within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Returned by the handshake, nothing sent yet.
    Created,
    /// Presence document written.
    Configured,
    /// Event subscription active.
    Subscribed,
    /// At least one long poll issued.
    Polling,
}

#[derive(Debug)]
struct EndpointInner {
    state: EndpointState,
    subscribed: bool,
    interests: Vec<String>,
}

/// One server-side device registration.
///
/// Every call goes through an [`ApiCaller`] with the registration token.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    host: MessagingHost,
    inner: Mutex<EndpointInner>,
}

impl Endpoint {
    pub fn new(id: EndpointId, host: MessagingHost) -> Self {
        Self {
            id,
            host,
            inner: Mutex::new(EndpointInner {
                state: EndpointState::Created,
                subscribed: false,
                interests: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn host(&self) -> &MessagingHost {
        &self.host
    }

    pub fn state(&self) -> EndpointState {
        self.lock().state
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscribed
    }

    /// Resources the subscription currently listens to.
    pub fn interests(&self) -> Vec<String> {
        self.lock().interests.clone()
    }

    /// Write the presence document that names this endpoint.
    #[instrument(skip(self, caller), fields(endpoint = %self.id))]
    pub async fn configure(&self, caller: &dyn ApiCaller, name: &str) -> Result<()> {
        let request = ApiRequest::put(self.url("presenceDocs/messagingService"))
            .auth(AuthKind::Registration)
            .json(json!({
                "id": "messagingService",
                "type": "EndpointPresenceDoc",
                "selfLink": "uri",
                "privateInfo": { "epname": name },
                "publicInfo": {
                    "capabilities": "",
                    "type": 1,
                    "skypeNameVersion": "skype.com",
                    "nodeInfo": "xx",
                    "version": "908/1.30.0.128",
                },
            }));
        caller.call(request).await?;

        let mut inner = self.lock();
        if inner.state == EndpointState::Created {
            inner.state = EndpointState::Configured;
        }
        debug!("Endpoint configured");
        Ok(())
    }

    /// Extend the server-side liveness window by `timeout` seconds.
    #[instrument(skip(self, caller), fields(endpoint = %self.id))]
    pub async fn ping(&self, caller: &dyn ApiCaller, timeout: u32) -> Result<()> {
        let request = ApiRequest::post(self.url("active"))
            .auth(AuthKind::Registration)
            .json(json!({ "timeout": timeout }));
        caller.call(request).await?;
        Ok(())
    }

    /// Subscribe to conversation and thread events.
    ///
    /// Does nothing when a subscription is already active.
    #[instrument(skip(self, caller), fields(endpoint = %self.id))]
    pub async fn subscribe(&self, caller: &dyn ApiCaller) -> Result<()> {
        if self.is_subscribed() {
            debug!("Already subscribed");
            return Ok(());
        }
        self.create_subscription(caller).await
    }

    /// Recreate the subscription even if one is believed active.
    #[instrument(skip(self, caller), fields(endpoint = %self.id))]
    pub async fn resubscribe(&self, caller: &dyn ApiCaller) -> Result<()> {
        self.lock().subscribed = false;
        self.create_subscription(caller).await
    }

    /// Take over the presence interests of the endpoint this one replaces.
    ///
    /// They are sent again with the next subscription.
    pub fn adopt_interests(&self, previous: &Endpoint) {
        let interests = previous.interests();
        self.lock().interests = interests;
    }

    async fn create_subscription(&self, caller: &dyn ApiCaller) -> Result<()> {
        let presence: Vec<String> = self
            .interests()
            .into_iter()
            .filter(|resource| !DEFAULT_INTERESTS.contains(&resource.as_str()))
            .collect();
        let interests: Vec<String> = DEFAULT_INTERESTS.iter().map(|s| s.to_string()).collect();
        let request = ApiRequest::post(self.url("subscriptions"))
            .auth(AuthKind::Registration)
            .json(json!({
                "interestedResources": interests,
                "template": "raw",
                "channelType": "HttpLongPoll",
                "conversationType": 2047,
            }));
        caller.call(request).await?;

        {
            let mut inner = self.lock();
            inner.subscribed = true;
            inner.interests = interests.clone();
            inner.state = EndpointState::Subscribed;
        }
        info!("Subscribed to events");

        if !presence.is_empty() {
            debug!(count = presence.len(), "Restoring presence interests");
            let mut interests = interests;
            interests.extend(presence);
            self.put_interests(caller, interests).await?;
        }
        Ok(())
    }

    /// Add presence interests for the given contact ids, keeping existing ones.
    #[instrument(skip(self, caller, contacts), fields(endpoint = %self.id, count = contacts.len()))]
    pub async fn subscribe_presence(&self, caller: &dyn ApiCaller, contacts: &[String]) -> Result<()> {
        self.subscribe(caller).await?;

        let mut interests = self.interests();
        for contact in contacts {
            let resource = format!("/v1/users/ME/contacts/8:{}", contact);
            if !interests.contains(&resource) {
                interests.push(resource);
            }
        }

        self.put_interests(caller, interests).await
    }

    async fn put_interests(&self, caller: &dyn ApiCaller, interests: Vec<String>) -> Result<()> {
        let request = ApiRequest::put(self.url("subscriptions/0"))
            .query("name", "interestedResources")
            .auth(AuthKind::Registration)
            .json(json!({ "interestedResources": interests }));
        caller.call(request).await?;

        self.lock().interests = interests;
        Ok(())
    }

    /// Long poll for events.
    ///
    /// The server holds the call open for up to ~30 seconds and answers with
    /// an empty batch when nothing happened.
    #[instrument(skip(self, caller), fields(endpoint = %self.id))]
    pub async fn get_events(&self, caller: &dyn ApiCaller, timeout: Duration) -> Result<EventBatch> {
        let request = ApiRequest::post(self.url("subscriptions/0/poll"))
            .auth(AuthKind::Registration)
            .timeout(timeout);
        let response = caller.call(request).await?;

        let batch = if response.text().trim().is_empty() {
            EventBatch::default()
        } else {
            response.json::<EventBatch>()?
        };
        self.lock().state = EndpointState::Polling;
        debug!(count = batch.events.len(), "Poll returned");
        Ok(batch)
    }

    fn url(&self, path: &str) -> String {
        self.host
            .url(&format!("users/ME/endpoints/{}/{}", self.id, path))
    }

    fn lock(&self) -> MutexGuard<'_, EndpointInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use skyconn_core::error::ProtocolError;
    use std::sync::Mutex as StdMutex;

    /// Records calls and answers each with a fixed body, or 404 when `fail` is set.
    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(String, String, Option<Value>)>>,
        body: String,
        fail: bool,
    }

    impl Recorder {
        fn with_body(body: &str) -> Self {
            Self {
                body: body.to_string(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, String, Option<Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiCaller for Recorder {
        async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
            assert_eq!(request.auth_kind(), AuthKind::Registration);
            let body = match request.body() {
                crate::transport::Body::Json(v) => Some(v.clone()),
                _ => None,
            };
            self.calls.lock().unwrap().push((
                request.method().to_string(),
                request.url().to_string(),
                body,
            ));
            if self.fail {
                return Err(ProtocolError::new(404, "POST", request.url(), None).into());
            }
            Ok(ApiResponse::for_test(200, &self.body))
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new(
            EndpointId::new("{11111111-2222-3333-4444-555555555555}").unwrap(),
            MessagingHost::default(),
        )
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let caller = Recorder::with_body(r#"{"eventMessages":[]}"#);
        let ep = endpoint();
        assert_eq!(ep.state(), EndpointState::Created);

        ep.configure(&caller, "skyconn").await.unwrap();
        assert_eq!(ep.state(), EndpointState::Configured);

        ep.subscribe(&caller).await.unwrap();
        assert_eq!(ep.state(), EndpointState::Subscribed);

        let batch = ep.get_events(&caller, Duration::from_secs(60)).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(ep.state(), EndpointState::Polling);
    }

    #[tokio::test]
    async fn configure_sends_presence_document() {
        let caller = Recorder::default();
        endpoint().configure(&caller, "desk").await.unwrap();
        let calls = caller.calls();
        assert_eq!(calls[0].0, "PUT");
        assert!(calls[0].1.ends_with(
            "/users/ME/endpoints/{11111111-2222-3333-4444-555555555555}/presenceDocs/messagingService"
        ));
        let doc = calls[0].2.clone().unwrap();
        assert_eq!(doc["privateInfo"]["epname"], "desk");
        assert_eq!(doc["type"], "EndpointPresenceDoc");
    }

    #[tokio::test]
    async fn subscribe_twice_creates_one_subscription() {
        let caller = Recorder::default();
        let ep = endpoint();
        ep.subscribe(&caller).await.unwrap();
        ep.subscribe(&caller).await.unwrap();
        assert!(ep.is_subscribed());
        assert_eq!(caller.calls().len(), 1);
        let body = caller.calls()[0].2.clone().unwrap();
        assert_eq!(body["channelType"], "HttpLongPoll");
        assert_eq!(body["conversationType"], 2047);
    }

    #[tokio::test]
    async fn resubscribe_always_calls() {
        let caller = Recorder::default();
        let ep = endpoint();
        ep.subscribe(&caller).await.unwrap();
        ep.resubscribe(&caller).await.unwrap();
        assert_eq!(caller.calls().len(), 2);
        assert!(ep.is_subscribed());
    }

    #[tokio::test]
    async fn failed_subscribe_leaves_endpoint_unsubscribed() {
        let caller = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let ep = endpoint();
        assert!(ep.subscribe(&caller).await.is_err());
        assert!(!ep.is_subscribed());
        assert_eq!(ep.state(), EndpointState::Created);
    }

    #[tokio::test]
    async fn presence_interests_extend() {
        let caller = Recorder::default();
        let ep = endpoint();
        ep.subscribe_presence(&caller, &["alice".to_string()]).await.unwrap();
        ep.subscribe_presence(&caller, &["bob".to_string(), "alice".to_string()])
            .await
            .unwrap();

        let interests = ep.interests();
        assert_eq!(interests.len(), DEFAULT_INTERESTS.len() + 2);
        assert!(interests.contains(&"/v1/users/ME/contacts/8:alice".to_string()));
        assert!(interests.contains(&"/v1/users/ME/contacts/8:bob".to_string()));

        let last = caller.calls().last().cloned().unwrap();
        assert_eq!(last.0, "PUT");
        assert!(last.1.ends_with("/subscriptions/0"));
        assert_eq!(
            last.2.unwrap()["interestedResources"].as_array().unwrap().len(),
            5
        );
    }

    #[tokio::test]
    async fn resubscribe_keeps_presence_interests() {
        let caller = Recorder::default();
        let ep = endpoint();
        ep.subscribe_presence(&caller, &["alice".to_string()]).await.unwrap();
        ep.resubscribe(&caller).await.unwrap();

        let calls = caller.calls();
        let methods: Vec<&str> = calls.iter().map(|c| c.0.as_str()).collect();
        assert_eq!(methods, ["POST", "PUT", "POST", "PUT"]);
        let last = calls.last().cloned().unwrap();
        assert!(last.1.ends_with("/subscriptions/0"));
        let sent = last.2.unwrap()["interestedResources"].clone();
        assert_eq!(sent.as_array().unwrap().len(), DEFAULT_INTERESTS.len() + 1);
        assert!(ep.interests().contains(&"/v1/users/ME/contacts/8:alice".to_string()));
    }

    #[tokio::test]
    async fn replacement_endpoint_resends_adopted_interests() {
        let caller = Recorder::default();
        let old = endpoint();
        old.subscribe_presence(&caller, &["bob".to_string()]).await.unwrap();

        let fresh = Endpoint::new(
            EndpointId::new("{99999999-2222-3333-4444-555555555555}").unwrap(),
            old.host().clone(),
        );
        fresh.adopt_interests(&old);
        assert!(!fresh.is_subscribed());
        fresh.subscribe(&caller).await.unwrap();

        let last = caller.calls().last().cloned().unwrap();
        assert_eq!(last.0, "PUT");
        assert!(last.1.contains("99999999"));
        assert_eq!(fresh.interests().len(), DEFAULT_INTERESTS.len() + 1);
    }

    #[tokio::test]
    async fn empty_poll_body_is_empty_batch() {
        let caller = Recorder::default();
        let batch = endpoint()
            .get_events(&caller, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn ping_sends_timeout() {
        let caller = Recorder::default();
        endpoint().ping(&caller, DEFAULT_PING_TIMEOUT).await.unwrap();
        let calls = caller.calls();
        assert!(calls[0].1.ends_with("/active"));
        assert_eq!(calls[0].2.clone().unwrap()["timeout"], 12);
    }
}
