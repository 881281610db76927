//! Identity types for the mailroom relay.
//!
//! All provider-side identifiers are opaque signed integers: the relay
//! never derives meaning from their values, only equality and storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A provider-assigned end-user identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Create a UserId from a raw provider value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw numeric value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// A provider-assigned topic thread identifier.
///
/// Each topic is a threaded sub-channel of the operator group, used as
/// the mailbox for exactly one user.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicId(i64);

impl TopicId {
    /// Create a TopicId from a raw provider value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw numeric value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({})", self.0)
    }
}

/// A provider-assigned message identifier.
///
/// Message ids are only unique within a single chat or topic; a
/// (chat, message id) pair is needed to address a message globally.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(i64);

impl MessageId {
    /// Create a MessageId from a raw provider value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw numeric value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

/// The store-assigned identifier of a recorded correspondence row.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrespondenceId(i64);

impl CorrespondenceId {
    /// Create a CorrespondenceId from a raw row id.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw numeric value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CorrespondenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CorrespondenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrespondenceId({})", self.0)
    }
}

/// Which side a relayed message originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The end-user wrote the original; the copy lives in the topic.
    UserToOperator,
    /// The operator wrote the original in a topic; the copy was sent
    /// to the user.
    OperatorToUser,
}

impl Direction {
    /// Stable string form, used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserToOperator => "user_to_operator",
            Self::OperatorToUser => "operator_to_user",
        }
    }

    /// Parse the stable string form produced by [`Direction::as_str`].
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user_to_operator" => Some(Self::UserToOperator),
            "operator_to_user" => Some(Self::OperatorToUser),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
