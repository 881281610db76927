//! The inbound event model.
//!
//! Events arrive from a single upstream connection and describe one
//! message-level change on either side of the relay: a new message, an
//! edit, or a deletion. Payloads are opaque to the relay; content is
//! copied by the transport adapter, never inspected here.

use crate::ids::{MessageId, TopicId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the relay an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A private chat between an end-user and the relay.
    User,
    /// The operator group (possibly inside a topic thread).
    Operator,
}

/// What happened to the message the event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message was posted.
    New,
    /// An existing message was edited in place.
    Edited,
    /// An existing message was deleted.
    Deleted,
}

/// The author of an inbound event, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Provider-assigned user id.
    pub id: UserId,
    /// Human-readable display name at the time of the event.
    pub display_name: String,
}

impl Sender {
    /// Create a sender description.
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Coarse payload classification.
///
/// Carried for logging only; the relay never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Plain text.
    Text,
    /// A photo, with optional caption baked into the body.
    Photo,
    /// A video.
    Video,
    /// A voice note.
    Voice,
    /// An audio file.
    Audio,
    /// A generic document.
    Document,
    /// A sticker.
    Sticker,
}

/// An opaque message payload.
///
/// The body is whatever the transport adapter needs to copy the message
/// to the other side (provider file handles, serialized content, ...).
/// The relay core treats it as bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Payload classification, for logs.
    pub kind: PayloadKind,
    /// Opaque content handle.
    pub body: Vec<u8>,
}

impl Payload {
    /// Create an opaque payload.
    pub fn new(kind: PayloadKind, body: Vec<u8>) -> Self {
        Self { kind, body }
    }

    /// Convenience constructor for text payloads.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Text,
            body: body.into().into_bytes(),
        }
    }

    /// Size of the opaque body in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Body is opaque and may be large; log kind and size only.
        write!(f, "Payload({:?}, {} bytes)", self.kind, self.body.len())
    }
}

/// One message-level change reported by the upstream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Which side the event happened on.
    pub source: SourceKind,
    /// Who authored the change.
    pub sender: Sender,
    /// The topic thread the event happened in, if any.
    ///
    /// `None` for private-chat events and for operator messages posted
    /// outside any topic (the group's general thread).
    pub thread: Option<TopicId>,
    /// The id of the affected message, in its own chat's numbering.
    pub message_id: MessageId,
    /// New message, edit, or deletion.
    pub kind: EventKind,
    /// The message content; absent for deletions.
    pub payload: Option<Payload>,
}

impl InboundEvent {
    /// A new message from an end-user's private chat.
    pub fn user_message(sender: Sender, message_id: MessageId, payload: Payload) -> Self {
        Self {
            source: SourceKind::User,
            sender,
            thread: None,
            message_id,
            kind: EventKind::New,
            payload: Some(payload),
        }
    }

    /// An edit to an earlier message in an end-user's private chat.
    pub fn user_edit(sender: Sender, message_id: MessageId, payload: Payload) -> Self {
        Self {
            source: SourceKind::User,
            sender,
            thread: None,
            message_id,
            kind: EventKind::Edited,
            payload: Some(payload),
        }
    }

    /// A deletion of an earlier message in an end-user's private chat.
    pub fn user_delete(sender: Sender, message_id: MessageId) -> Self {
        Self {
            source: SourceKind::User,
            sender,
            thread: None,
            message_id,
            kind: EventKind::Deleted,
            payload: None,
        }
    }

    /// A new operator message, optionally inside a topic thread.
    pub fn operator_message(
        sender: Sender,
        thread: Option<TopicId>,
        message_id: MessageId,
        payload: Payload,
    ) -> Self {
        Self {
            source: SourceKind::Operator,
            sender,
            thread,
            message_id,
            kind: EventKind::New,
            payload: Some(payload),
        }
    }

    /// An operator edit, optionally inside a topic thread.
    pub fn operator_edit(
        sender: Sender,
        thread: Option<TopicId>,
        message_id: MessageId,
        payload: Payload,
    ) -> Self {
        Self {
            source: SourceKind::Operator,
            sender,
            thread,
            message_id,
            kind: EventKind::Edited,
            payload: Some(payload),
        }
    }

    /// An operator deletion, optionally inside a topic thread.
    pub fn operator_delete(
        sender: Sender,
        thread: Option<TopicId>,
        message_id: MessageId,
    ) -> Self {
        Self {
            source: SourceKind::Operator,
            sender,
            thread,
            message_id,
            kind: EventKind::Deleted,
            payload: None,
        }
    }
}
