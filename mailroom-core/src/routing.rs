//! The relay routing table as a pure function.
//!
//! [`route`] maps one inbound event, plus the facts the service layer
//! already looked up (the matching correspondence, the owner of the
//! event's topic), to a [`Decision`]. It performs no I/O and holds no
//! state, so the entire routing table is testable without mocks.

use crate::lifecycle::{CorrespondenceState, LifecycleEvent};
use mailroom_types::{
    CorrespondenceId, EventKind, InboundEvent, MessageId, SourceKind, TopicId, UserId,
};

/// The slice of a stored correspondence the router needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrespondenceRef {
    /// Store row id.
    pub id: CorrespondenceId,
    /// The end-user this correspondence belongs to.
    pub user_id: UserId,
    /// The topic holding the operator-side message.
    pub topic_id: TopicId,
    /// The user-side message id.
    pub user_message_id: MessageId,
    /// The operator-side message id.
    pub operator_message_id: MessageId,
    /// Whether the pair has been soft-deleted.
    pub deleted: bool,
}

impl CorrespondenceRef {
    fn state(&self) -> CorrespondenceState {
        CorrespondenceState::from_deleted_flag(self.deleted)
    }
}

/// Facts the service layer resolved before asking for a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingContext {
    /// The correspondence matching the event's message id, if recorded.
    pub correspondence: Option<CorrespondenceRef>,
    /// The user owning the event's topic thread, if the thread is known.
    pub topic_owner: Option<UserId>,
}

/// Why an event produced no outbound action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Operator message outside any topic thread (general group chat).
    OutsideTopic,
    /// Operator message in a thread no user is mapped to.
    UnknownTopic,
    /// Edit of a correspondence that is already deleted.
    AlreadyDeleted,
}

/// What the service layer should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Provision the sender's topic, copy the message into it, record
    /// the pair. Also used for edits of messages that were never
    /// relayed: the edit is treated as a fresh message.
    ForwardUserMessage,
    /// Edit the topic-side copy of the referenced pair.
    EditTopicCopy(CorrespondenceRef),
    /// Delete the topic-side copy and mark the pair deleted.
    DeleteTopicCopy(CorrespondenceRef),
    /// Copy an operator message from a topic to its owning user and
    /// record the pair.
    ForwardOperatorMessage {
        /// The user owning the topic the operator wrote in.
        user: UserId,
    },
    /// Edit the user-side copy of the referenced pair.
    EditUserCopy(CorrespondenceRef),
    /// Delete the user-side copy and mark the pair deleted.
    DeleteUserCopy(CorrespondenceRef),
    /// Take no action.
    Ignore(IgnoreReason),
    /// The event references a pair that was never recorded. Reported,
    /// never retried as a new send (that would risk duplicate relays).
    CorrespondenceNotFound,
}

/// Decide what to do with an inbound event.
///
/// The caller is responsible for having filled `ctx` appropriately:
/// `correspondence` from the store lookup keyed by the event's message
/// id, and `topic_owner` for operator events inside a thread.
pub fn route(event: &InboundEvent, ctx: &RoutingContext) -> Decision {
    match event.source {
        SourceKind::User => route_user(event, ctx),
        SourceKind::Operator => route_operator(event, ctx),
    }
}

fn route_user(event: &InboundEvent, ctx: &RoutingContext) -> Decision {
    match event.kind {
        EventKind::New => Decision::ForwardUserMessage,
        EventKind::Edited => match ctx.correspondence {
            Some(c) => match c.state().on_event(LifecycleEvent::Edit) {
                Ok(_) => Decision::EditTopicCopy(c),
                Err(_) => Decision::Ignore(IgnoreReason::AlreadyDeleted),
            },
            // Edit-of-unknown-message policy: relay it as a new message.
            None => Decision::ForwardUserMessage,
        },
        EventKind::Deleted => match ctx.correspondence {
            Some(c) => Decision::DeleteTopicCopy(c),
            None => Decision::CorrespondenceNotFound,
        },
    }
}

fn route_operator(event: &InboundEvent, ctx: &RoutingContext) -> Decision {
    // Operator traffic outside any topic thread is not relay traffic.
    if event.thread.is_none() {
        return Decision::Ignore(IgnoreReason::OutsideTopic);
    }

    match event.kind {
        EventKind::New => match ctx.topic_owner {
            Some(user) => Decision::ForwardOperatorMessage { user },
            None => Decision::Ignore(IgnoreReason::UnknownTopic),
        },
        EventKind::Edited => match ctx.correspondence {
            Some(c) => match c.state().on_event(LifecycleEvent::Edit) {
                Ok(_) => Decision::EditUserCopy(c),
                Err(_) => Decision::Ignore(IgnoreReason::AlreadyDeleted),
            },
            None => Decision::CorrespondenceNotFound,
        },
        EventKind::Deleted => match ctx.correspondence {
            Some(c) => Decision::DeleteUserCopy(c),
            None => Decision::CorrespondenceNotFound,
        },
    }
}
