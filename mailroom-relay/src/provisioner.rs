//! Lazy topic provisioning.
//!
//! Translates "this user needs a mailbox" into a guaranteed topic id,
//! hiding provider-side creation latency and failure. Topics are only
//! ever created on demand, one per user.

use crate::error::RelayError;
use crate::limits::RateLimits;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::IdentityStore;
use crate::transport::{Destination, Transport};
use mailroom_types::{Sender, TopicId};
use std::sync::Arc;

/// Ensures exactly one live topic exists per user.
pub struct TopicProvisioner {
    store: Arc<dyn IdentityStore>,
    transport: Arc<dyn Transport>,
    limits: RateLimits,
    retry: RetryPolicy,
}

impl TopicProvisioner {
    /// Create a provisioner over the shared store and transport.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        transport: Arc<dyn Transport>,
        limits: RateLimits,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            limits,
            retry,
        }
    }

    /// Return the user's live topic, creating one if none exists.
    ///
    /// Callers hold the user's lock, so creation is serialized per
    /// user. Should a duplicate creation slip through anyway, the
    /// store keeps the first recorded topic and the loser is
    /// discarded - its id is never handed out.
    ///
    /// A creation failure surfaces as
    /// [`RelayError::TopicProvisionFailed`] and the triggering message
    /// is not relayed.
    pub async fn ensure_topic(&self, sender: &Sender) -> Result<TopicId, RelayError> {
        if let Some(topic) = self.store.topic_for_user(sender.id).await? {
            return Ok(topic.topic_id);
        }

        let title = topic_title(sender);
        tracing::info!("Creating topic {:?} for user {}", title, sender.id);

        self.limits.acquire(sender.id).await;
        let created = with_retry(&self.retry, || self.transport.create_topic(&title))
            .await
            .map_err(|source| RelayError::TopicProvisionFailed {
                user: sender.id,
                source,
            })?;

        let winner = self.store.insert_topic(sender.id, created).await?;
        if winner.topic_id != created {
            tracing::warn!(
                "Duplicate topic creation for user {}: keeping {}, discarding {}",
                sender.id,
                winner.topic_id,
                created
            );
            return Ok(winner.topic_id);
        }

        tracing::info!("Topic {} created for user {}", created, sender.id);
        self.post_user_card(sender, created).await;
        Ok(created)
    }

    /// Post an introduction card into a fresh topic and pin it.
    ///
    /// Both steps are best-effort: the mailbox works without the card,
    /// so failures are logged and swallowed.
    async fn post_user_card(&self, sender: &Sender, topic: TopicId) {
        let dest = Destination::Topic(topic);
        let card = user_card(sender);

        match self.transport.post_notice(dest, &card).await {
            Ok(message_id) => {
                if let Err(e) = self.transport.pin_message(dest, message_id).await {
                    tracing::warn!("Could not pin user card in topic {}: {}", topic, e);
                }
            }
            Err(e) => {
                tracing::warn!("Could not post user card in topic {}: {}", topic, e);
            }
        }
    }
}

/// Topic title shown to the operator, derived from user metadata.
fn topic_title(sender: &Sender) -> String {
    format!("{} (ID: {})", sender.display_name, sender.id)
}

/// Introduction card pinned at the top of a fresh topic.
fn user_card(sender: &Sender) -> String {
    format!(
        "New conversation\nname: {}\nuser id: {}",
        sender.display_name, sender.id
    )
}
