//! Raw event records and the long-poll envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EventKind, MessageKind};

/// One event record exactly as the server sent it.
///
/// Accessors read well-known fields without copying or rewriting the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(Value);

impl RawEvent {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Numeric event id, usually counting up from 1000.
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// The `resourceType` discriminator.
    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    /// Dispatch key derived from the discriminator.
    pub fn kind(&self) -> EventKind {
        self.resource_type()
            .map(EventKind::from_resource_type)
            .unwrap_or(EventKind::Other)
    }

    /// Message sub-kind, for [`EventKind::NewMessage`] records.
    pub fn message_kind(&self) -> Option<MessageKind> {
        if self.kind() != EventKind::NewMessage {
            return None;
        }
        let resource = self.resource()?;
        let message_type = resource
            .get("messagetype")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let edited = resource
            .get("skypeeditedid")
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
        Some(MessageKind::classify(message_type, edited))
    }

    /// Event timestamp as sent (`%Y-%m-%dT%H:%M:%SZ`).
    pub fn time(&self) -> Option<&str> {
        self.0.get("time").and_then(Value::as_str)
    }

    /// The nested `resource` object.
    pub fn resource(&self) -> Option<&Value> {
        self.0.get("resource")
    }

    /// URL to POST to when the server asks for an acknowledgement.
    pub fn ack_url(&self) -> Option<&str> {
        self.resource()
            .and_then(|r| r.get("ackrequired"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Borrow the raw JSON.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the raw JSON.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// The long-poll response envelope: `{"eventMessages": [...]}`.
///
/// A missing array is an empty batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(rename = "eventMessages", default)]
    pub events: Vec<RawEvent>,
}

impl EventBatch {
    /// Whether the server returned nothing before the poll timed out.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
