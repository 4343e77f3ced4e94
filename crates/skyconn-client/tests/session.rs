//! Connection lifecycle: endpoint setup, polling, recovery and token renewal.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::{
    CountingProvider, ENDPOINT_ID, connection, endpoint_path, mount_endpoint_setup,
    mount_profile, mount_registration, registration_header,
};
use skyconn_client::{ApiRequest, AuthKind, EndpointState};
use skyconn_core::error::Error;
use skyconn_core::{EventKind, MessageKind, TokenKind};

const LOGIN_FORM: &str = r#"<script>var ServerData = {sFT:'<input type="hidden" name="PPFT" id="i0327" value="ppft-abc123"/>'};</script>"#;

async fn mount_subscription(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions")))
        .and(body_string_contains("HttpLongPoll"))
        .respond_with(ResponseTemplate::new(201))
        .expect(expected)
        .mount(server)
        .await;
}

fn message_event() -> serde_json::Value {
    json!({
        "id": 1001,
        "type": "EventMessage",
        "resourceType": "NewMessage",
        "time": "2024-01-01T12:00:00Z",
        "resourceLink": "https://host/v1/users/ME/conversations/8:bob/messages/1",
        "resource": {
            "messagetype": "RichText",
            "content": "hello",
            "from": "https://host/v1/users/ME/contacts/8:bob",
        }
    })
}

#[tokio::test]
async fn test_password_login_to_first_poll() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/login/oauth/microsoft"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "MSPRequ=requ; Path=/")
                .append_header("Set-Cookie", "MSPOK=ok; Path=/")
                .set_body_string(LOGIN_FORM),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/live/ppsecure/post.srf"))
        .and(body_string_contains("passwd="))
        .respond_with(ResponseTemplate::new(200).set_body_string("urlPost:'post.srf?opid=ABC123'"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/live/ppsecure/post.srf"))
        .and(body_string_contains("opid=ABC123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"<input type="hidden" name="t" id="t" value="t-1"/>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/microsoft"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<input type="hidden" name="skypetoken" value="primary-e2e"/><input type="hidden" name="expires_in" value="3600"/>"#,
        ))
        .mount(&server)
        .await;

    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 1).await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "eventMessages": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login_password(skyconn_core::Credentials::new("alice.example", "hunter2"))
        .await
        .unwrap();

    let endpoint = conn.endpoint().unwrap();
    assert_eq!(endpoint.id().as_str(), ENDPOINT_ID);
    assert_eq!(endpoint.state(), EndpointState::Configured);
    assert_eq!(conn.known_endpoints().len(), 2);

    conn.subscribe().await.unwrap();
    assert_eq!(endpoint.state(), EndpointState::Subscribed);

    let batch = conn.get_events().await.unwrap();
    assert!(batch.is_empty());
    assert_eq!(endpoint.state(), EndpointState::Polling);
}

#[tokio::test]
async fn test_subscribe_twice_creates_one_subscription() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 1).await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    conn.subscribe().await.unwrap();
    conn.subscribe().await.unwrap();
    assert!(conn.endpoint().unwrap().is_subscribed());
}

#[tokio::test]
async fn test_poll_returns_events_untouched() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 1).await;

    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eventMessages": [message_event(), { "id": 1002, "resourceType": "SomethingNew" }]
        })))
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let batch = conn.get_events().await.unwrap();
    assert_eq!(batch.events.len(), 2);
    assert_eq!(batch.events[0].kind(), EventKind::NewMessage);
    assert_eq!(batch.events[0].message_kind(), Some(MessageKind::Posted));
    assert_eq!(batch.events[0].as_value(), &message_event());
    assert_eq!(batch.events[1].kind(), EventKind::Other);
    assert_eq!(batch.events[1].resource_type(), Some("SomethingNew"));
}

#[tokio::test]
async fn test_lapsed_subscription_is_recreated_once() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    // Initial subscription plus one forced resubscribe.
    mount_subscription(&server, 2).await;

    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": 729,
            "message": "You must create an endpoint before performing this operation."
        })))
        .expect(2)
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let err = conn.get_events().await.unwrap_err();
    match err {
        Error::SubscriptionLapsed { endpoint } => assert_eq!(endpoint, ENDPOINT_ID),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_single_lapse_recovers() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 2).await;

    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eventMessages": [message_event()]
        })))
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let batch = conn.get_events().await.unwrap();
    assert_eq!(batch.events.len(), 1);
}

#[tokio::test]
async fn test_rejected_registration_reruns_handshake() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 2).await;

    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "eventMessages": [] })))
        .mount(&server)
        .await;

    let provider = CountingProvider::new();
    let conn = connection(&server);
    conn.login(provider.clone()).await.unwrap();

    let batch = conn.get_events().await.unwrap();
    assert!(batch.is_empty());
    // Only the registration was renewed; the primary token was still good.
    assert_eq!(provider.calls(), 1);
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_expiry_equal_to_now_forces_renewal() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;

    Mock::given(method("GET"))
        .and(path("/api/users/self/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = CountingProvider::expiring_first();
    let conn = connection(&server);
    conn.login(provider.clone()).await.unwrap();
    assert_eq!(provider.calls(), 1);
    assert!(!conn.tokens().is_valid_now(TokenKind::Primary));

    let request = ApiRequest::get(format!("{}/users/self/settings", conn.urls().api))
        .auth(AuthKind::PrimaryToken);
    conn.call(request).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(conn.tokens().primary.unwrap().as_str(), "primary-2");
}

#[tokio::test]
async fn test_sync_state_resumes_list_calls() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;

    let resume = format!(
        "{}/v1/users/ME/conversations?syncState=page2",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/v1/users/ME/conversations"))
        .and(query_param("pageSize", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversations": [{ "id": "8:bob" }],
            "_metadata": { "syncState": resume },
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/ME/conversations"))
        .and(query_param("syncState", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversations": [{ "id": "8:carol" }],
            "_metadata": {},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let url = format!("{}/v1/users/ME/conversations", server.uri());
    let list = || {
        ApiRequest::get(url.clone())
            .query("pageSize", "10")
            .auth(AuthKind::Registration)
    };

    let first = conn.sync_state_call(list()).await.unwrap();
    assert_eq!(first["conversations"][0]["id"], "8:bob");
    let second = conn.sync_state_call(list()).await.unwrap();
    assert_eq!(second["conversations"][0]["id"], "8:carol");
    assert_eq!(conn.cursors().depth("GET", &url), 1);
}

#[tokio::test]
async fn test_ack_posts_to_resource_url() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;

    Mock::given(method("POST"))
        .and(path("/v1/users/ME/acks/77"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let event = skyconn_core::RawEvent::new(json!({
        "id": 77,
        "resourceType": "NewMessage",
        "resource": { "ackrequired": format!("{}/v1/users/ME/acks/77", server.uri()) }
    }));
    assert!(conn.ack(&event).await.unwrap());

    let plain = skyconn_core::RawEvent::new(message_event());
    assert!(!conn.ack(&plain).await.unwrap());
}

#[tokio::test]
async fn test_presence_subscription_extends_interests() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 1).await;

    Mock::given(method("PUT"))
        .and(path_regex(endpoint_path("subscriptions/0")))
        .and(query_param("name", "interestedResources"))
        .and(body_string_contains("/v1/users/ME/contacts/8:bob"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();
    conn.subscribe_presence(&["bob".to_string()]).await.unwrap();

    let interests = conn.endpoint().unwrap().interests();
    assert!(interests.contains(&"/v1/threads/ALL".to_string()));
    assert!(interests.contains(&"/v1/users/ME/contacts/8:bob".to_string()));
}

#[tokio::test]
async fn test_event_stream_yields_across_polls() {
    let server = MockServer::start().await;
    mount_registration(&server, "alice.example").await;
    mount_subscription(&server, 1).await;

    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "eventMessages": [] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "eventMessages": [message_event(), message_event()]
        })))
        .mount(&server)
        .await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let events: Vec<_> = conn.events().take(3).collect().await;
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.is_ok()));
}

/// Hands out a registration and counts how often it was asked.
struct CountedHandshake(Arc<AtomicUsize>);

impl Respond for CountedHandshake {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.0.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(201)
            .insert_header("Set-RegistrationToken", registration_header(Some(ENDPOINT_ID)))
    }
}

/// Answers 404 until the handshake has run `healthy_after` times.
struct DeadEndpoint {
    handshakes: Arc<AtomicUsize>,
    healthy_after: usize,
    healthy: ResponseTemplate,
}

impl Respond for DeadEndpoint {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.handshakes.load(Ordering::SeqCst) >= self.healthy_after {
            self.healthy.clone()
        } else {
            ResponseTemplate::new(404).set_body_json(json!({
                "errorCode": 729,
                "message": "You must create an endpoint before performing this operation."
            }))
        }
    }
}

/// The endpoint is gone server-side until a second handshake creates a new one.
async fn mount_dropped_endpoint(server: &MockServer) -> Arc<AtomicUsize> {
    let handshakes = Arc::new(AtomicUsize::new(0));
    mount_profile(server, "alice.example").await;
    mount_endpoint_setup(server).await;

    Mock::given(method("POST"))
        .and(path("/v1/users/ME/endpoints"))
        .respond_with(CountedHandshake(handshakes.clone()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions")))
        .respond_with(DeadEndpoint {
            handshakes: handshakes.clone(),
            healthy_after: 2,
            healthy: ResponseTemplate::new(201),
        })
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(endpoint_path("subscriptions/0/poll")))
        .respond_with(DeadEndpoint {
            handshakes: handshakes.clone(),
            healthy_after: 2,
            healthy: ResponseTemplate::new(200).set_body_json(json!({
                "eventMessages": [message_event()]
            })),
        })
        .mount(server)
        .await;
    handshakes
}

#[tokio::test]
async fn test_lapse_drops_registration_and_next_poll_reregisters() {
    let server = MockServer::start().await;
    let handshakes = mount_dropped_endpoint(&server).await;

    let provider = CountingProvider::new();
    let conn = connection(&server);
    conn.login(provider.clone()).await.unwrap();
    assert_eq!(handshakes.load(Ordering::SeqCst), 1);

    let err = conn.get_events().await.unwrap_err();
    assert!(matches!(err, Error::SubscriptionLapsed { .. }));
    assert!(!conn.is_connected());

    let batch = conn.get_events().await.unwrap();
    assert_eq!(batch.events.len(), 1);
    assert_eq!(handshakes.load(Ordering::SeqCst), 2);
    assert!(conn.is_connected());
    // The primary token was still good; only the registration was redone.
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_event_stream_survives_dropped_endpoint() {
    let server = MockServer::start().await;
    let handshakes = mount_dropped_endpoint(&server).await;

    let conn = connection(&server);
    conn.login(CountingProvider::new()).await.unwrap();

    let mut stream = conn.events();
    let items = tokio::time::timeout(Duration::from_secs(10), async {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            let done = item.is_ok();
            items.push(item);
            if done {
                break;
            }
        }
        items
    })
    .await
    .expect("stream recovered within the timeout");

    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Err(Error::SubscriptionLapsed { .. })));
    assert_eq!(items[1].as_ref().unwrap().kind(), EventKind::NewMessage);
    assert_eq!(handshakes.load(Ordering::SeqCst), 2);
}
