//! skyconn-client - HTTP implementation of the skyconn messaging protocol.
//!
//! Authenticates through one of several [`AuthProvider`]s, trades the
//! resulting primary token for a registration token and endpoint through the
//! [registration handshake](handshake), and long polls that endpoint for
//! account events.
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use skyconn_client::{Connection, ServiceUrls, SessionConfig};
//! use skyconn_core::GuestInvite;
//!
//! # async fn example() -> skyconn_core::Result<()> {
//! let conn = Connection::new(
//!     ServiceUrls::default(),
//!     SessionConfig::default().session_file("/tmp/skyconn-session"),
//! )?;
//! conn.login_guest(GuestInvite::new("https://join.skype.com/Ab3dEf6hIj9K", "Visitor")?)
//!     .await?;
//!
//! let mut events = conn.events();
//! while let Some(event) = events.next().await {
//!     let event = event?;
//!     println!("{:?}", event.kind());
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod config;
mod connection;
mod endpoint;
pub mod handshake;
mod pagination;
mod retry;
mod stream;
mod transport;

pub use auth::{AuthContext, AuthProvider, GuestAuth, LiveAuth, RefreshAuth, SoapAuth};
pub use config::{DEFAULT_USER_AGENT, ServiceUrls, SessionConfig};
pub use connection::Connection;
pub use endpoint::{ApiCaller, DEFAULT_INTERESTS, DEFAULT_PING_TIMEOUT, Endpoint, EndpointState};
pub use handshake::{Registration, RegistrationHandshake};
pub use pagination::SyncStateCursors;
pub use retry::{Recoverer, Recovery, RetryChain, RetryPolicy};
pub use stream::EventStream;
pub use transport::{ApiRequest, ApiResponse, AuthKind, Body, DEFAULT_ACCEPTED, HttpTransport};
