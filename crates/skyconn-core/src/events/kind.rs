//! Dispatch registry for event resource types.

use serde::Serialize;

/// The `resourceType` discriminator of an event record.
///
/// Every known discriminator maps to exactly one variant; anything else is
/// [`EventKind::Other`], so new server-side types never fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// A contact changed availability.
    UserPresence,
    /// One of a contact's endpoints came or went.
    EndpointPresence,
    /// A message, typing notification, edit, or call signal.
    NewMessage,
    /// A conversation's properties changed (read horizon, topic, ...).
    ConversationUpdate,
    /// A group thread's membership or properties changed.
    ThreadUpdate,
    /// A resource type with no registered variant.
    Other,
}

impl EventKind {
    /// Every registered variant with its wire name.
    pub const REGISTRY: [(&'static str, EventKind); 5] = [
        ("UserPresence", EventKind::UserPresence),
        ("EndpointPresence", EventKind::EndpointPresence),
        ("NewMessage", EventKind::NewMessage),
        ("ConversationUpdate", EventKind::ConversationUpdate),
        ("ThreadUpdate", EventKind::ThreadUpdate),
    ];

    /// Look up the variant for a `resourceType` value.
    pub fn from_resource_type(value: &str) -> Self {
        match value {
            "UserPresence" => EventKind::UserPresence,
            "EndpointPresence" => EventKind::EndpointPresence,
            "NewMessage" => EventKind::NewMessage,
            "ConversationUpdate" => EventKind::ConversationUpdate,
            "ThreadUpdate" => EventKind::ThreadUpdate,
            _ => EventKind::Other,
        }
    }

    /// Wire name, or `None` for [`EventKind::Other`].
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            EventKind::UserPresence => Some("UserPresence"),
            EventKind::EndpointPresence => Some("EndpointPresence"),
            EventKind::NewMessage => Some("NewMessage"),
            EventKind::ConversationUpdate => Some("ConversationUpdate"),
            EventKind::ThreadUpdate => Some("ThreadUpdate"),
            EventKind::Other => None,
        }
    }
}

/// Second-level dispatch for [`EventKind::NewMessage`] records, keyed on the
/// resource's `messagetype` and `skypeeditedid` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    /// A freshly posted text or rich-text message.
    Posted,
    /// An edit of an earlier message.
    Edited,
    /// Typing started or stopped.
    Typing,
    /// Call signalling.
    Call,
    /// Any other message type.
    Other,
}

impl MessageKind {
    /// Classify a message by its `messagetype` and whether it carries an edit id.
    pub fn classify(message_type: &str, edited: bool) -> Self {
        match message_type {
            "Text"
            | "RichText"
            | "RichText/Contacts"
            | "RichText/Media_GenericFile"
            | "RichText/UriObject" => {
                if edited {
                    MessageKind::Edited
                } else {
                    MessageKind::Posted
                }
            }
            "Control/Typing" | "Control/ClearTyping" => MessageKind::Typing,
            "Event/Call" => MessageKind::Call,
            _ => MessageKind::Other,
        }
    }
}
