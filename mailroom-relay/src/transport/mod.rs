//! Transport adapter seam.
//!
//! The relay never talks to the messaging provider directly; it calls
//! the abstract operations below. A production adapter wraps the
//! provider's API and is constructed with the operator group binding;
//! [`MockTransport`] stands in for tests.
//!
//! Payloads are opaque here too: `send_copy` means "copy this message
//! to that destination", however the provider does that.

mod mock;

pub use mock::{MockTransport, TransportCall};

use crate::error::TransportError;
use async_trait::async_trait;
use mailroom_types::{MessageId, Payload, TopicId, UserId};
use std::fmt;

/// Where a transport operation acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A user's private chat.
    User(UserId),
    /// A topic thread inside the operator group.
    Topic(TopicId),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {}", id),
            Self::Topic(id) => write!(f, "topic {}", id),
        }
    }
}

/// Abstract provider operations the relay depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy a message to the destination.
    ///
    /// Returns the provider-assigned id of the copy, in the
    /// destination chat's numbering.
    async fn send_copy(
        &self,
        dest: Destination,
        payload: &Payload,
    ) -> Result<MessageId, TransportError>;

    /// Replace the content of an earlier copy in place.
    async fn edit_copy(
        &self,
        dest: Destination,
        message_id: MessageId,
        payload: &Payload,
    ) -> Result<(), TransportError>;

    /// Delete an earlier copy.
    async fn delete_copy(
        &self,
        dest: Destination,
        message_id: MessageId,
    ) -> Result<(), TransportError>;

    /// Create a topic thread in the operator group.
    async fn create_topic(&self, title: &str) -> Result<TopicId, TransportError>;

    /// Post a service notice (plain text authored by the relay itself).
    async fn post_notice(
        &self,
        dest: Destination,
        text: &str,
    ) -> Result<MessageId, TransportError>;

    /// Pin a message in the destination chat.
    async fn pin_message(
        &self,
        dest: Destination,
        message_id: MessageId,
    ) -> Result<(), TransportError>;
}
