//! Raw event records delivered by the long-poll subscription.
//!
//! The core passes event records through untouched. [`EventKind`] is the
//! dispatch key higher layers use to pick a typed representation.

mod kind;
mod raw;

pub use kind::{EventKind, MessageKind};
pub use raw::{EventBatch, RawEvent};
