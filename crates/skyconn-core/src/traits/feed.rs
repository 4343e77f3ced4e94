//! Event feed trait.

use futures_core::Stream;

use crate::Result;
use crate::events::RawEvent;

/// A stream of raw event records from a messaging endpoint.
pub trait EventFeed: Stream<Item = Result<RawEvent>> + Send {}

impl<T> EventFeed for T where T: Stream<Item = Result<RawEvent>> + Send {}
