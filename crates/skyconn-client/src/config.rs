//! Service locations and per-session settings.

use std::path::PathBuf;
use std::time::Duration;

use skyconn_core::MessagingHost;

/// Base URLs of every service the client talks to.
///
/// Defaults point at production. Tests point everything at a mock server with
/// [`ServiceUrls::rooted_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    /// Account login pages (`/oauth/microsoft`, `/microsoft`, `/login`).
    pub login: String,
    /// Microsoft account pages (`/ppsecure/post.srf`, `/RST.srf`).
    pub live: String,
    /// Security token to primary token exchange.
    pub edge: String,
    /// User API (`/users/self/profile`).
    pub api: String,
    /// Public conversation join service.
    pub join: String,
    /// Messaging host used until a handshake redirects elsewhere.
    pub messaging: MessagingHost,
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self {
            login: "https://login.skype.com/login".to_string(),
            live: "https://login.live.com".to_string(),
            edge: "https://edge.skype.com/rps/v1/rps/skypetoken".to_string(),
            api: "https://api.skype.com".to_string(),
            join: "https://join.skype.com".to_string(),
            messaging: MessagingHost::default(),
        }
    }
}

impl ServiceUrls {
    /// Every service under one base URL, each on its own path prefix.
    ///
    /// `login` lives at `{base}/login`, `live` at `{base}/live`, `edge` at
    /// `{base}/edge`, `api` at `{base}/api`, `join` at `{base}/join` and the
    /// messaging host at `{base}/v1`.
    pub fn rooted_at(base: &str) -> skyconn_core::Result<Self> {
        let base = base.trim_end_matches('/');
        Ok(Self {
            login: format!("{}/login", base),
            live: format!("{}/live", base),
            edge: format!("{}/edge", base),
            api: format!("{}/api", base),
            join: format!("{}/join", base),
            messaging: MessagingHost::new(format!("{}/v1", base))?,
        })
    }

    /// Replace the default messaging host.
    pub fn with_messaging(mut self, host: MessagingHost) -> Self {
        self.messaging = host;
        self
    }
}

/// Default user agent for API calls.
pub const DEFAULT_USER_AGENT: &str = concat!("skyconn/", env!("CARGO_PKG_VERSION"));

/// Settings for one [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where to persist the token set. `None` keeps it in memory only.
    pub session_file: Option<PathBuf>,
    /// Try the session file before running an auth provider.
    pub prefer_persisted: bool,
    /// Timeout for ordinary calls.
    pub request_timeout: Duration,
    /// Timeout for the long poll. Must exceed the server's ~30 second hold.
    pub poll_timeout: Duration,
    /// Name shown for this endpoint in the account's device list.
    pub endpoint_name: String,
    /// Give up on a handshake that has not converged after this many rounds.
    pub max_handshake_rounds: u32,
    /// User agent for API calls.
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_file: None,
            prefer_persisted: true,
            request_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(60),
            endpoint_name: "skyconn".to_string(),
            max_handshake_rounds: 8,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SessionConfig {
    /// Persist the token set at `path`.
    pub fn session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Choose between persisted-session and fresh-credential startup.
    pub fn prefer_persisted(mut self, prefer: bool) -> Self {
        self.prefer_persisted = prefer;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn endpoint_name(mut self, name: impl Into<String>) -> Self {
        self.endpoint_name = name.into();
        self
    }

    pub fn max_handshake_rounds(mut self, rounds: u32) -> Self {
        self.max_handshake_rounds = rounds.max(1);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }
}
