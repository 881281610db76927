//! Identity store for mailroom-relay.
//!
//! Owns the durable user ↔ topic mapping and the message-id
//! correspondences. No message content is ever persisted, only
//! identifiers and routing metadata.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StoreError;
use async_trait::async_trait;
use mailroom_types::{CorrespondenceId, Direction, MessageId, Sender, TopicId, UserId};

/// A known end-user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Provider-assigned id.
    pub id: UserId,
    /// Display name from the most recent inbound message.
    pub display_name: String,
    /// Unix timestamp of the first message ever seen from this user.
    pub first_seen: i64,
}

/// A topic mailbox owned by one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicRecord {
    /// Provider-assigned topic id.
    pub topic_id: TopicId,
    /// The owning user.
    pub user_id: UserId,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Whether the topic has been retired (stale on the provider side).
    pub deleted: bool,
}

/// One recorded message pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    /// Store row id.
    pub id: CorrespondenceId,
    /// The end-user side of the pair.
    pub user_id: UserId,
    /// Message id in the user's private chat.
    pub user_message_id: MessageId,
    /// The topic holding the operator-side message.
    pub topic_id: TopicId,
    /// Message id inside the topic.
    pub operator_message_id: MessageId,
    /// Which side authored the original.
    pub direction: Direction,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Unix timestamp of the relay.
    pub created_at: i64,
}

/// Request to record a newly relayed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCorrespondence {
    /// The end-user side of the pair.
    pub user_id: UserId,
    /// Message id in the user's private chat.
    pub user_message_id: MessageId,
    /// The topic holding the operator-side message.
    pub topic_id: TopicId,
    /// Message id inside the topic.
    pub operator_message_id: MessageId,
    /// Which side authored the original.
    pub direction: Direction,
}

/// Trait for identity store backends.
///
/// All mutations are durable before the call returns, so callers can
/// act on the result without a separate confirmation step. Uniqueness
/// is enforced by database constraints, not application checks.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert the user or refresh their display name.
    ///
    /// `first_seen` is set on insert and preserved on update.
    async fn upsert_user(&self, sender: &Sender) -> Result<(), StoreError>;

    /// Fetch a user by id.
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// The user's current (non-retired) topic, if any.
    async fn topic_for_user(&self, user_id: UserId) -> Result<Option<TopicRecord>, StoreError>;

    /// Record a freshly created topic for a user.
    ///
    /// Safe under a concurrent creation race: the row that wins stays,
    /// and the winning record is returned either way. A caller whose
    /// topic id is not in the returned record must discard its topic.
    async fn insert_topic(
        &self,
        user_id: UserId,
        topic_id: TopicId,
    ) -> Result<TopicRecord, StoreError>;

    /// Soft-delete a topic that turned out to be stale on the provider
    /// side. Idempotent.
    async fn retire_topic(&self, topic_id: TopicId) -> Result<(), StoreError>;

    /// The user owning a topic, ignoring retired topics.
    async fn topic_owner(&self, topic_id: TopicId) -> Result<Option<UserId>, StoreError>;

    /// Insert a new correspondence row.
    ///
    /// Fails with [`StoreError::DuplicateCorrespondence`] if either
    /// side's (id, direction) key already exists.
    async fn record_correspondence(
        &self,
        new: NewCorrespondence,
    ) -> Result<Correspondence, StoreError>;

    /// Look up a pair by the user-side message id.
    async fn find_by_user_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<Option<Correspondence>, StoreError>;

    /// Look up a pair by the operator-side (topic) message id.
    async fn find_by_operator_message(
        &self,
        topic_id: TopicId,
        message_id: MessageId,
    ) -> Result<Option<Correspondence>, StoreError>;

    /// Mark a pair deleted. Idempotent; a no-op if already deleted.
    async fn mark_deleted(&self, id: CorrespondenceId) -> Result<(), StoreError>;
}
