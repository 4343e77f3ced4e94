//! skyconn-core - Core types, tokens and session persistence for the skyconn
//! messaging client.

pub mod credentials;
pub mod error;
pub mod events;
pub mod store;
pub mod tokens;
pub mod traits;
pub mod types;

pub use credentials::{Credentials, GuestInvite};
pub use error::Error;
pub use events::{EventBatch, EventKind, MessageKind, RawEvent};
pub use store::FileSessionStore;
pub use tokens::{AuthOutcome, PrimaryToken, RegistrationToken, TokenKind, TokenSet};
pub use traits::{EventFeed, SessionStore};
pub use types::{DEFAULT_MESSAGING_HOST, EndpointId, MessagingHost, SELF_ENDPOINT};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
