//! The relay engine.
//!
//! For each inbound event the engine looks up the relevant facts,
//! asks `mailroom-core` for a routing decision, and executes that
//! decision against the transport and the identity store. It holds no
//! authoritative state of its own; everything durable lives in the
//! store.
//!
//! Work is serialized per affected user (see [`crate::locks`]) and
//! every transport call goes through pacing and bounded retry, so a
//! failing provider can delay a relay but never wedge it.
//!
//! One inconsistency window exists by construction: a copy can be
//! delivered and the process die before the pair is recorded. The
//! failed record is logged loudly rather than papered over; the store
//! only ever claims pairs whose delivery succeeded.

use crate::config::Config;
use crate::error::{RelayError, TransportError};
use crate::limits::RateLimits;
use crate::locks::UserLocks;
use crate::provisioner::TopicProvisioner;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{Correspondence, IdentityStore, NewCorrespondence};
use crate::transport::{Destination, Transport};
use mailroom_core::routing::{route, CorrespondenceRef, Decision, IgnoreReason, RoutingContext};
use mailroom_types::{
    CorrespondenceId, Direction, EventKind, InboundEvent, MessageId, Payload, Sender, SourceKind,
    TopicId, UserId,
};
use std::sync::Arc;

/// What handling an event produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A message was copied across and the pair recorded.
    Relayed {
        /// The recorded pair.
        correspondence: CorrespondenceId,
        /// The topic involved (existing or freshly provisioned).
        topic: TopicId,
    },
    /// The mirrored copy was edited in place.
    Edited {
        /// The pair whose copy was edited.
        correspondence: CorrespondenceId,
    },
    /// The mirrored copy was deleted and the pair marked deleted.
    Deleted {
        /// The pair that is now deleted.
        correspondence: CorrespondenceId,
    },
    /// The event required no action.
    Ignored(IgnoreReason),
}

/// The routing engine; cheap to share behind an [`Arc`].
pub struct RelayEngine {
    store: Arc<dyn IdentityStore>,
    transport: Arc<dyn Transport>,
    provisioner: TopicProvisioner,
    limits: RateLimits,
    retry: RetryPolicy,
    locks: UserLocks,
}

impl RelayEngine {
    /// Build an engine over the shared store and transport adapter.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Self {
        let limits = RateLimits::new(&config.limits);
        let retry = RetryPolicy::from_config(&config.retry);
        let provisioner = TopicProvisioner::new(
            store.clone(),
            transport.clone(),
            limits.clone(),
            retry.clone(),
        );

        Self {
            store,
            transport,
            provisioner,
            limits,
            retry,
            locks: UserLocks::new(),
        }
    }

    /// Handle one inbound event end to end.
    ///
    /// Errors describe why a relay was dropped; they are meant to be
    /// logged by the dispatcher, never to crash it. The end-user gets
    /// no failure signal (the protocol has no delivery confirmation).
    pub async fn handle_event(&self, event: &InboundEvent) -> Result<RelayOutcome, RelayError> {
        match event.source {
            SourceKind::User => self.handle_user_event(event).await,
            SourceKind::Operator => self.handle_operator_event(event).await,
        }
    }

    async fn handle_user_event(&self, event: &InboundEvent) -> Result<RelayOutcome, RelayError> {
        let user = event.sender.id;
        let lock = self.locks.for_user(user);
        let _guard = lock.lock().await;

        self.store.upsert_user(&event.sender).await?;

        let correspondence = match event.kind {
            EventKind::New => None,
            EventKind::Edited | EventKind::Deleted => {
                self.store
                    .find_by_user_message(user, event.message_id)
                    .await?
            }
        };

        let ctx = RoutingContext {
            correspondence: correspondence.as_ref().map(to_ref),
            topic_owner: None,
        };
        self.execute(event, route(event, &ctx)).await
    }

    async fn handle_operator_event(
        &self,
        event: &InboundEvent,
    ) -> Result<RelayOutcome, RelayError> {
        let (correspondence, topic_owner) = match event.thread {
            None => (None, None),
            Some(thread) => {
                let owner = self.store.topic_owner(thread).await?;
                let correspondence = match event.kind {
                    EventKind::New => None,
                    EventKind::Edited | EventKind::Deleted => {
                        self.store
                            .find_by_operator_message(thread, event.message_id)
                            .await?
                    }
                };
                (correspondence, owner)
            }
        };

        let ctx = RoutingContext {
            correspondence: correspondence.as_ref().map(to_ref),
            topic_owner,
        };
        let decision = route(event, &ctx);

        // Serialize against the affected user's other traffic.
        match affected_user(&decision) {
            Some(user) => {
                let lock = self.locks.for_user(user);
                let _guard = lock.lock().await;
                self.execute(event, decision).await
            }
            None => self.execute(event, decision).await,
        }
    }

    async fn execute(
        &self,
        event: &InboundEvent,
        decision: Decision,
    ) -> Result<RelayOutcome, RelayError> {
        match decision {
            Decision::ForwardUserMessage => self.forward_user_message(event).await,
            Decision::ForwardOperatorMessage { user } => {
                self.forward_operator_message(event, user).await
            }
            Decision::EditTopicCopy(c) => {
                self.edit_mirror(event, Destination::Topic(c.topic_id), c.operator_message_id, c)
                    .await
            }
            Decision::EditUserCopy(c) => {
                self.edit_mirror(event, Destination::User(c.user_id), c.user_message_id, c)
                    .await
            }
            Decision::DeleteTopicCopy(c) => {
                self.delete_mirror(Destination::Topic(c.topic_id), c.operator_message_id, c)
                    .await
            }
            Decision::DeleteUserCopy(c) => {
                self.delete_mirror(Destination::User(c.user_id), c.user_message_id, c)
                    .await
            }
            Decision::Ignore(reason) => {
                tracing::debug!(
                    "Ignoring {:?} event for message {}: {:?}",
                    event.kind,
                    event.message_id,
                    reason
                );
                Ok(RelayOutcome::Ignored(reason))
            }
            Decision::CorrespondenceNotFound => {
                tracing::warn!(
                    "No correspondence recorded for message {}; dropping {:?} event",
                    event.message_id,
                    event.kind
                );
                Err(RelayError::CorrespondenceNotFound {
                    message_id: event.message_id,
                })
            }
        }
    }

    /// Copy a user message into their topic mailbox and record the
    /// pair.
    async fn forward_user_message(
        &self,
        event: &InboundEvent,
    ) -> Result<RelayOutcome, RelayError> {
        let payload = required_payload(event)?;
        let topic = self.provisioner.ensure_topic(&event.sender).await?;
        let (topic, delivered) = self.send_into_topic(&event.sender, topic, payload).await?;

        let recorded = self
            .store
            .record_correspondence(NewCorrespondence {
                user_id: event.sender.id,
                user_message_id: event.message_id,
                topic_id: topic,
                operator_message_id: delivered,
                direction: Direction::UserToOperator,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    "Message {} from user {} was delivered into topic {} but recording \
                     the pair failed: {}",
                    event.message_id,
                    event.sender.id,
                    topic,
                    e
                );
                e
            })?;

        tracing::info!(
            "Relayed {:?} message {} from user {} into topic {}",
            payload.kind,
            event.message_id,
            event.sender.id,
            topic
        );
        Ok(RelayOutcome::Relayed {
            correspondence: recorded.id,
            topic,
        })
    }

    /// Send into a recorded topic, re-provisioning once if the topic
    /// turns out to be stale on the provider side.
    async fn send_into_topic(
        &self,
        sender: &Sender,
        topic: TopicId,
        payload: &Payload,
    ) -> Result<(TopicId, MessageId), RelayError> {
        match self
            .paced_send(sender.id, Destination::Topic(topic), payload)
            .await
        {
            Ok(delivered) => Ok((topic, delivered)),
            Err(TransportError::TopicNotFound) => {
                tracing::warn!(
                    "Topic {} vanished on the provider; re-provisioning for user {}",
                    topic,
                    sender.id
                );
                self.store.retire_topic(topic).await?;
                let fresh = self.provisioner.ensure_topic(sender).await?;
                let delivered = self
                    .paced_send(sender.id, Destination::Topic(fresh), payload)
                    .await
                    .map_err(|e| self.transport_error(e))?;
                Ok((fresh, delivered))
            }
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// Copy an operator message from a topic to its owning user and
    /// record the pair.
    async fn forward_operator_message(
        &self,
        event: &InboundEvent,
        user: UserId,
    ) -> Result<RelayOutcome, RelayError> {
        let payload = required_payload(event)?;
        let topic = event.thread.ok_or(RelayError::MalformedEvent {
            reason: "operator forward without a topic thread",
        })?;

        let delivered = self
            .paced_send(user, Destination::User(user), payload)
            .await
            .map_err(|e| self.transport_error(e))?;

        let recorded = self
            .store
            .record_correspondence(NewCorrespondence {
                user_id: user,
                user_message_id: delivered,
                topic_id: topic,
                operator_message_id: event.message_id,
                direction: Direction::OperatorToUser,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    "Operator message {} from topic {} was delivered to user {} but \
                     recording the pair failed: {}",
                    event.message_id,
                    topic,
                    user,
                    e
                );
                e
            })?;

        tracing::info!(
            "Relayed {:?} operator message {} from topic {} to user {}",
            payload.kind,
            event.message_id,
            topic,
            user
        );
        Ok(RelayOutcome::Relayed {
            correspondence: recorded.id,
            topic,
        })
    }

    /// Apply an edit to the mirrored copy of a pair.
    async fn edit_mirror(
        &self,
        event: &InboundEvent,
        dest: Destination,
        target: MessageId,
        c: CorrespondenceRef,
    ) -> Result<RelayOutcome, RelayError> {
        let payload = required_payload(event)?;

        self.limits.acquire(c.user_id).await;
        with_retry(&self.retry, || self.transport.edit_copy(dest, target, payload))
            .await
            .map_err(|e| self.transport_error(e))?;

        tracing::info!("Edited mirrored copy {} at {}", target, dest);
        Ok(RelayOutcome::Edited { correspondence: c.id })
    }

    /// Delete the mirrored copy of a pair and mark the pair deleted.
    ///
    /// Idempotent: a pair already marked deleted skips the transport
    /// call, and a copy already gone on the provider side is fine.
    async fn delete_mirror(
        &self,
        dest: Destination,
        target: MessageId,
        c: CorrespondenceRef,
    ) -> Result<RelayOutcome, RelayError> {
        if !c.deleted {
            self.limits.acquire(c.user_id).await;
            match with_retry(&self.retry, || self.transport.delete_copy(dest, target)).await {
                Ok(()) => {}
                Err(TransportError::MessageNotFound) => {
                    tracing::debug!("Mirrored copy {} at {} was already gone", target, dest);
                }
                Err(e) => return Err(self.transport_error(e)),
            }
        }

        self.store.mark_deleted(c.id).await?;
        tracing::info!("Deleted mirrored copy {} at {}", target, dest);
        Ok(RelayOutcome::Deleted { correspondence: c.id })
    }

    async fn paced_send(
        &self,
        user: UserId,
        dest: Destination,
        payload: &Payload,
    ) -> Result<MessageId, TransportError> {
        self.limits.acquire(user).await;
        with_retry(&self.retry, || self.transport.send_copy(dest, payload)).await
    }

    /// Map a transport failure that survived the retry loop.
    fn transport_error(&self, e: TransportError) -> RelayError {
        if e.is_transient() {
            RelayError::TransportUnavailable {
                attempts: self.retry.max_attempts,
                source: e,
            }
        } else {
            RelayError::Transport(e)
        }
    }
}

fn to_ref(c: &Correspondence) -> CorrespondenceRef {
    CorrespondenceRef {
        id: c.id,
        user_id: c.user_id,
        topic_id: c.topic_id,
        user_message_id: c.user_message_id,
        operator_message_id: c.operator_message_id,
        deleted: c.deleted,
    }
}

/// The user whose traffic a decision touches, if any.
fn affected_user(decision: &Decision) -> Option<UserId> {
    match decision {
        Decision::ForwardOperatorMessage { user } => Some(*user),
        Decision::EditTopicCopy(c)
        | Decision::DeleteTopicCopy(c)
        | Decision::EditUserCopy(c)
        | Decision::DeleteUserCopy(c) => Some(c.user_id),
        Decision::ForwardUserMessage
        | Decision::Ignore(_)
        | Decision::CorrespondenceNotFound => None,
    }
}

fn required_payload(event: &InboundEvent) -> Result<&Payload, RelayError> {
    event.payload.as_ref().ok_or(RelayError::MalformedEvent {
        reason: "message event without payload",
    })
}
