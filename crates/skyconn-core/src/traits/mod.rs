//! Core traits for session persistence and event delivery.

mod feed;
mod store;

pub use feed::EventFeed;
pub use store::SessionStore;
