//! A logged-in session: tokens, endpoint and every call made on its behalf.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use skyconn_core::error::{AuthError, Error};
use skyconn_core::{
    Credentials, EndpointId, EventBatch, FileSessionStore, GuestInvite, MessagingHost, RawEvent,
    Result, SessionStore, TokenKind, TokenSet,
};

use crate::auth::{AuthContext, AuthProvider, GuestAuth, LiveAuth, RefreshAuth, SoapAuth};
use crate::config::{ServiceUrls, SessionConfig};
use crate::endpoint::{ApiCaller, Endpoint};
use crate::handshake::RegistrationHandshake;
use crate::pagination::SyncStateCursors;
use crate::retry::{Recoverer, Recovery, RetryChain};
use crate::stream::EventStream;
use crate::transport::{ApiRequest, ApiResponse, AuthKind, HttpTransport};

/// An authenticated session against the messaging service.
///
/// Cheap to clone; clones share tokens, endpoint and pagination state.
/// Tokens are checked before every call and renewed inline when expired,
/// so a call after a long idle gap may take an extra round trip or two.
///
/// # Example
///
/// ```no_run
/// use skyconn_client::{Connection, ServiceUrls, SessionConfig};
/// use skyconn_core::Credentials;
///
/// # async fn example() -> skyconn_core::Result<()> {
/// let conn = Connection::new(ServiceUrls::default(), SessionConfig::default())?;
/// conn.login_password(Credentials::new("alice.example", "hunter2")).await?;
///
/// let batch = conn.get_events().await?;
/// for event in batch.events {
///     println!("{:?} {:?}", event.kind(), event.resource_type());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    transport: HttpTransport,
    urls: ServiceUrls,
    config: SessionConfig,
    tokens: RwLock<TokenSet>,
    /// Serialises renewal so concurrent callers run it once.
    renew: Mutex<()>,
    provider: RwLock<Option<Arc<dyn AuthProvider>>>,
    endpoint: RwLock<Option<Arc<Endpoint>>>,
    known_endpoints: RwLock<Vec<EndpointId>>,
    cursors: SyncStateCursors,
    store: Option<Box<dyn SessionStore>>,
}

impl Connection {
    /// Create a connection. Nothing is sent until a login or [`connect`](Self::connect).
    ///
    /// Tokens are persisted to `config.session_file` when one is set.
    pub fn new(urls: ServiceUrls, config: SessionConfig) -> Result<Self> {
        let store = config
            .session_file
            .clone()
            .map(|path| Box::new(FileSessionStore::new(path)) as Box<dyn SessionStore>);
        Self::build(urls, config, store)
    }

    /// Create a connection persisting through a custom store.
    pub fn with_store(
        urls: ServiceUrls,
        config: SessionConfig,
        store: impl SessionStore + 'static,
    ) -> Result<Self> {
        Self::build(urls, config, Some(Box::new(store)))
    }

    fn build(
        urls: ServiceUrls,
        config: SessionConfig,
        store: Option<Box<dyn SessionStore>>,
    ) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let tokens = TokenSet::new(urls.messaging.clone());
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                transport,
                urls,
                config,
                tokens: RwLock::new(tokens),
                renew: Mutex::new(()),
                provider: RwLock::new(None),
                endpoint: RwLock::new(None),
                known_endpoints: RwLock::new(Vec::new()),
                cursors: SyncStateCursors::new(),
                store,
            }),
        })
    }

    /// Use `provider` whenever the primary token has to be obtained again.
    pub fn set_provider(&self, provider: impl AuthProvider + 'static) {
        *write(&self.inner.provider) = Some(Arc::new(provider));
    }

    /// Authenticate with `provider`, then register an endpoint.
    ///
    /// The provider is kept for renewing the primary token later.
    #[instrument(skip(self, provider), fields(provider = provider.name()))]
    pub async fn login(&self, provider: impl AuthProvider + 'static) -> Result<()> {
        self.set_provider(provider);
        let _guard = self.inner.renew.lock().await;
        self.authenticate_locked().await?;
        self.register_locked().await
    }

    /// Log in with a username or email address and password.
    ///
    /// Email addresses go through the security-token exchange, plain
    /// usernames through the account login pages.
    pub async fn login_password(&self, credentials: Credentials) -> Result<()> {
        if credentials.is_email() {
            self.login(SoapAuth::new(credentials)).await
        } else {
            self.login(LiveAuth::new(credentials)).await
        }
    }

    /// Join a public conversation as a temporary guest.
    pub async fn login_guest(&self, invite: GuestInvite) -> Result<()> {
        self.login(GuestAuth::new(invite)).await
    }

    /// Bring the session up using the configured startup mode.
    ///
    /// With `prefer_persisted` set, a stored session is reused when possible:
    /// an expired or corrupt file falls through to the configured provider,
    /// and an expired registration reruns only the handshake.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.renew.lock().await;
        if self.inner.config.prefer_persisted {
            match self.restore_locked().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(Error::Auth(AuthError::SessionExpired | AuthError::SessionCorrupt { .. })) => {
                    warn!("Stored session unusable, authenticating again");
                }
                Err(e) => return Err(e),
            }
        }
        self.authenticate_locked().await?;
        self.register_locked().await
    }

    /// Resume from the session store only.
    ///
    /// Returns `false` when nothing is stored.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<bool> {
        let _guard = self.inner.renew.lock().await;
        self.restore_locked().await
    }

    async fn restore_locked(&self) -> Result<bool> {
        let Some(store) = self.inner.store.as_ref() else {
            return Ok(false);
        };
        let Some(tokens) = store.load()? else {
            return Ok(false);
        };

        let registered = tokens.registration.is_some();
        let endpoint_id = tokens
            .endpoint
            .clone()
            .unwrap_or_else(EndpointId::self_alias);
        let host = tokens.host.clone();
        info!(identity = ?tokens.identity, registered, "Session restored");
        *write(&self.inner.tokens) = tokens;

        if registered {
            *write(&self.inner.endpoint) = Some(Arc::new(Endpoint::new(endpoint_id, host)));
        } else {
            self.register_locked().await?;
        }
        Ok(true)
    }

    /// Renew the primary token by presenting the current one, then register again.
    #[instrument(skip(self))]
    pub async fn refresh_primary_token(&self) -> Result<()> {
        let _guard = self.inner.renew.lock().await;
        let current = read(&self.inner.tokens)
            .primary
            .clone()
            .ok_or(AuthError::NoCredentials)?;
        let ctx = AuthContext {
            transport: &self.inner.transport,
            urls: &self.inner.urls,
            current: Some(&current),
        };
        let outcome = RefreshAuth::new().authenticate(ctx).await?;
        write(&self.inner.tokens).set_primary(outcome);
        self.register_locked().await
    }

    /// Make sure the given token half is valid, renewing it if not.
    ///
    /// An expired primary token is obtained again from the configured
    /// provider; an expired registration reruns the handshake.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoCredentials`] when the primary token has expired and no
    /// provider is configured, or whatever the renewal itself fails with.
    pub async fn ensure_valid(&self, kind: TokenKind) -> Result<()> {
        if read(&self.inner.tokens).is_valid_now(kind) {
            return Ok(());
        }
        let _guard = self.inner.renew.lock().await;
        self.ensure_valid_locked(kind).await
    }

    async fn ensure_valid_locked(&self, kind: TokenKind) -> Result<()> {
        // Another caller may have renewed while we waited for the lock.
        if !read(&self.inner.tokens).is_valid_now(TokenKind::Primary) {
            debug!("Primary token expired, renewing");
            self.authenticate_locked().await?;
            self.persist()?;
        }
        if kind == TokenKind::Registration && !read(&self.inner.tokens).is_valid_now(kind) {
            debug!("Registration token expired, rerunning handshake");
            self.register_locked().await?;
        }
        Ok(())
    }

    /// Send a call, renewing whichever token it carries first.
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        if let Some(kind) = request.auth_kind().token_kind() {
            self.ensure_valid(kind).await?;
        }
        let tokens = self.tokens();
        self.inner.transport.send_authed(&request, &tokens).await
    }

    /// Send a list call that resumes from the server's sync state.
    ///
    /// The first call for a method and URL goes out as given. When a reply
    /// carries `_metadata.syncState`, the next call for the same method and
    /// URL goes to that address instead, with no query parameters.
    pub async fn sync_state_call(&self, request: ApiRequest) -> Result<Value> {
        let method = request.method().as_str().to_string();
        let url = request.url().to_string();
        let params = request.query_params().to_vec();
        self.inner
            .cursors
            .call(&method, &url, params, |target, params| async move {
                let response = self.call(request.retarget(target).with_query(params)).await?;
                let body: Value = response.json()?;
                let cursor = body
                    .pointer("/_metadata/syncState")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok((body, cursor))
            })
            .await
    }

    /// Create or renew the event subscription on the current endpoint.
    pub async fn subscribe(&self) -> Result<()> {
        self.current_endpoint().await?.subscribe(self).await
    }

    /// Extend the endpoint's liveness window.
    pub async fn ping(&self, timeout: u32) -> Result<()> {
        self.current_endpoint().await?.ping(self, timeout).await
    }

    /// Listen for presence changes of the given contacts.
    pub async fn subscribe_presence(&self, contacts: &[String]) -> Result<()> {
        self.current_endpoint()
            .await?
            .subscribe_presence(self, contacts)
            .await
    }

    /// Long poll once for events.
    ///
    /// Subscribes first if needed. A rejected registration (401) reruns the
    /// handshake and a lapsed subscription (404) is recreated, each retried
    /// once.
    ///
    /// # Errors
    ///
    /// [`Error::SubscriptionLapsed`] when the poll still fails with 404 after
    /// resubscribing. The registration is dropped with it, so the next call
    /// registers a new endpoint.
    #[instrument(skip(self))]
    pub async fn get_events(&self) -> Result<EventBatch> {
        let timeout = self.inner.config.poll_timeout;
        let result = RetryChain::for_events()
            .run(self, || async move {
                self.ensure_valid(TokenKind::Registration).await?;
                let endpoint = self.current_endpoint().await?;
                endpoint.subscribe(self).await?;
                endpoint.get_events(self, timeout).await
            })
            .await;

        match result {
            Err(err) if err.status() == Some(404) => {
                let endpoint = self
                    .endpoint()
                    .map(|e| e.id().to_string())
                    .unwrap_or_default();
                warn!(%endpoint, "Subscription lapsed after resubscribing, dropping registration");
                self.drop_registration().await;
                Err(Error::SubscriptionLapsed { endpoint })
            }
            other => other,
        }
    }

    /// Forget the registration so the next registration-token call reruns
    /// the handshake and gets a fresh endpoint.
    async fn drop_registration(&self) {
        let _guard = self.inner.renew.lock().await;
        write(&self.inner.tokens).clear_registration();
    }

    /// Acknowledge an event that asked for it.
    ///
    /// Returns `false` without sending anything when the event has no
    /// acknowledgement address.
    pub async fn ack(&self, event: &RawEvent) -> Result<bool> {
        let Some(url) = event.ack_url() else {
            return Ok(false);
        };
        self.call(ApiRequest::post(url).auth(AuthKind::Registration))
            .await?;
        Ok(true)
    }

    /// Poll continuously, one long poll at a time.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.clone())
    }

    /// Forget every token and delete the stored session.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.inner.renew.lock().await;
        if let Some(store) = self.inner.store.as_ref() {
            store.clear()?;
        }
        *write(&self.inner.tokens) = TokenSet::new(self.inner.urls.messaging.clone());
        *write(&self.inner.endpoint) = None;
        write(&self.inner.known_endpoints).clear();
        self.inner.cursors.clear();
        info!("Logged out");
        Ok(())
    }

    pub fn identity(&self) -> Option<String> {
        read(&self.inner.tokens).identity.clone()
    }

    /// Messaging host the session is registered on.
    pub fn host(&self) -> MessagingHost {
        read(&self.inner.tokens).host.clone()
    }

    pub fn is_connected(&self) -> bool {
        read(&self.inner.tokens).is_connected()
    }

    pub fn is_guest(&self) -> bool {
        read(&self.inner.tokens).is_guest()
    }

    /// The endpoint created by the last handshake.
    pub fn endpoint(&self) -> Option<Arc<Endpoint>> {
        read(&self.inner.endpoint).clone()
    }

    /// Every endpoint the account had active at the last registration.
    pub fn known_endpoints(&self) -> Vec<EndpointId> {
        read(&self.inner.known_endpoints).clone()
    }

    /// Fetch the account's active endpoints again and remember them.
    #[instrument(skip(self))]
    pub async fn refresh_endpoints(&self) -> Result<Vec<EndpointId>> {
        self.ensure_valid(TokenKind::Registration).await?;
        let host = self.host();
        let known = sync_endpoints(self, &host).await?;
        *write(&self.inner.known_endpoints) = known.clone();
        Ok(known)
    }

    /// A copy of the current token set.
    pub fn tokens(&self) -> TokenSet {
        read(&self.inner.tokens).clone()
    }

    pub fn cursors(&self) -> &SyncStateCursors {
        &self.inner.cursors
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn urls(&self) -> &ServiceUrls {
        &self.inner.urls
    }

    async fn current_endpoint(&self) -> Result<Arc<Endpoint>> {
        if let Some(endpoint) = self.endpoint() {
            return Ok(endpoint);
        }
        self.ensure_valid(TokenKind::Registration).await?;
        let mut slot = write(&self.inner.endpoint);
        let endpoint = slot.get_or_insert_with(|| {
            let tokens = read(&self.inner.tokens);
            let id = tokens
                .endpoint
                .clone()
                .unwrap_or_else(EndpointId::self_alias);
            Arc::new(Endpoint::new(id, tokens.host.clone()))
        });
        Ok(endpoint.clone())
    }

    /// Run the configured provider and record the account identity.
    async fn authenticate_locked(&self) -> Result<()> {
        let provider = read(&self.inner.provider)
            .clone()
            .ok_or(AuthError::NoCredentials)?;
        let current = read(&self.inner.tokens).primary.clone();
        let ctx = AuthContext {
            transport: &self.inner.transport,
            urls: &self.inner.urls,
            current: current.as_ref(),
        };
        let outcome = provider.authenticate(ctx).await?;
        write(&self.inner.tokens).set_primary(outcome);

        let identity = self.fetch_identity().await?;
        info!(provider = provider.name(), identity = ?identity, "Authenticated");
        write(&self.inner.tokens).identity = identity;
        Ok(())
    }

    async fn fetch_identity(&self) -> Result<Option<String>> {
        let request = ApiRequest::get(format!("{}/users/self/profile", self.inner.urls.api))
            .auth(AuthKind::PrimaryToken);
        let body: Value = Unchecked(self).call(request).await?.json()?;
        Ok(body
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Run the handshake, set up the new endpoint and persist the result.
    async fn register_locked(&self) -> Result<()> {
        let (primary, host) = {
            let tokens = read(&self.inner.tokens);
            let primary = tokens.primary.clone().ok_or(AuthError::NoCredentials)?;
            (primary, tokens.host.clone())
        };

        let registration =
            RegistrationHandshake::new(&self.inner.transport, self.inner.config.max_handshake_rounds)
                .run(&primary, &host)
                .await?;
        write(&self.inner.tokens).set_registration(
            registration.token,
            registration.expiry,
            registration.host.clone(),
            Some(registration.endpoint.clone()),
        );

        let endpoint = Arc::new(Endpoint::new(registration.endpoint, registration.host));
        if let Some(previous) = self.endpoint() {
            endpoint.adopt_interests(&previous);
        }
        let caller = Unchecked(self);
        endpoint
            .configure(&caller, &self.inner.config.endpoint_name)
            .await?;
        let known = sync_endpoints(&caller, endpoint.host()).await?;
        debug!(count = known.len(), "Active endpoints");

        *write(&self.inner.known_endpoints) = known;
        *write(&self.inner.endpoint) = Some(endpoint);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        match self.inner.store.as_ref() {
            Some(store) => store.save(&read(&self.inner.tokens)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ApiCaller for Connection {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        Connection::call(self, request).await
    }
}

#[async_trait]
impl Recoverer for Connection {
    async fn recover(&self, action: Recovery) -> Result<()> {
        match action {
            Recovery::RefreshRegistration => {
                let _guard = self.inner.renew.lock().await;
                write(&self.inner.tokens).clear_registration();
                self.ensure_valid_locked(TokenKind::Registration).await
            }
            Recovery::Resubscribe => self.current_endpoint().await?.resubscribe(self).await,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tokens = read(&self.inner.tokens);
        f.debug_struct("Connection")
            .field("identity", &tokens.identity)
            .field("host", &tokens.host)
            .field("endpoint", &tokens.endpoint)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

/// Sends with the tokens as they are, for use while the renewal lock is held.
struct Unchecked<'a>(&'a Connection);

#[async_trait]
impl ApiCaller for Unchecked<'_> {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
        let tokens = self.0.tokens();
        self.0.inner.transport.send_authed(&request, &tokens).await
    }
}

/// List the account's active endpoints from its presence documents.
async fn sync_endpoints(caller: &dyn ApiCaller, host: &MessagingHost) -> Result<Vec<EndpointId>> {
    let request = ApiRequest::get(host.url("users/ME/presenceDocs/messagingService"))
        .query("view", "expanded")
        .auth(AuthKind::Registration);
    let body: Value = caller.call(request).await?.json()?;
    let docs = body
        .get("endpointPresenceDocs")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut endpoints = Vec::new();
    for doc in docs {
        let Some(link) = doc.get("link").and_then(Value::as_str) else {
            continue;
        };
        if let Some(id) = endpoint_from_link(link) {
            let id = EndpointId::new(id)?;
            if !endpoints.contains(&id) {
                endpoints.push(id);
            }
        }
    }
    Ok(endpoints)
}

/// The segment after `endpoints/` in a presence document link.
fn endpoint_from_link(link: &str) -> Option<&str> {
    let mut segments = link.split('/');
    segments.by_ref().find(|s| *s == "endpoints")?;
    segments.next().filter(|s| !s.is_empty())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
