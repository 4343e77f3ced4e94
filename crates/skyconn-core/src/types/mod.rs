//! Core protocol types.
//!
//! These types validate at construction time, so a host or endpoint id that
//! made it into a request has already been checked.

mod endpoint_id;
mod host;

pub use endpoint_id::{EndpointId, SELF_ENDPOINT};
pub use host::{DEFAULT_MESSAGING_HOST, MessagingHost};
