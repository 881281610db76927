//! Mock transport for testing.
//!
//! Records every call and hands out sequential provider ids; failures
//! can be queued per operation to script transient and permanent
//! provider behavior.

use super::{Destination, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use mailroom_types::{MessageId, Payload, TopicId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `send_copy` was invoked.
    SendCopy {
        /// Where the copy went.
        dest: Destination,
        /// The payload that was copied.
        payload: Payload,
        /// The message id the mock assigned.
        assigned: MessageId,
    },
    /// `edit_copy` was invoked.
    EditCopy {
        /// Where the edit went.
        dest: Destination,
        /// The message that was edited.
        message_id: MessageId,
        /// The replacement payload.
        payload: Payload,
    },
    /// `delete_copy` was invoked.
    DeleteCopy {
        /// Where the deletion went.
        dest: Destination,
        /// The message that was deleted.
        message_id: MessageId,
    },
    /// `create_topic` was invoked.
    CreateTopic {
        /// The requested topic title.
        title: String,
        /// The topic id the mock assigned.
        assigned: TopicId,
    },
    /// `post_notice` was invoked.
    PostNotice {
        /// Where the notice went.
        dest: Destination,
        /// The notice text.
        text: String,
    },
    /// `pin_message` was invoked.
    PinMessage {
        /// Where the pin happened.
        dest: Destination,
        /// The pinned message.
        message_id: MessageId,
    },
}

#[derive(Debug, Default)]
struct MockTransportInner {
    calls: Vec<TransportCall>,
    next_message_id: i64,
    next_topic_id: i64,
    send_failures: VecDeque<TransportError>,
    edit_failures: VecDeque<TransportError>,
    delete_failures: VecDeque<TransportError>,
    create_topic_failures: VecDeque<TransportError>,
    notice_failures: VecDeque<TransportError>,
    pin_failures: VecDeque<TransportError>,
}

/// Mock transport for testing.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a new mock transport.
    ///
    /// Assigned message ids start at 1000 and topic ids at 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                next_message_id: 1000,
                next_topic_id: 1,
                ..MockTransportInner::default()
            })),
        }
    }

    /// Set the next topic id the mock will assign.
    pub fn set_next_topic_id(&self, id: i64) {
        self.inner.lock().unwrap().next_topic_id = id;
    }

    /// Set the next message id the mock will assign.
    pub fn set_next_message_id(&self, id: i64) {
        self.inner.lock().unwrap().next_message_id = id;
    }

    /// Queue a failure for the next `send_copy` call.
    ///
    /// Queued failures are consumed in order; once the queue is empty,
    /// calls succeed again.
    pub fn fail_next_send(&self, error: TransportError) {
        self.inner.lock().unwrap().send_failures.push_back(error);
    }

    /// Queue a failure for the next `edit_copy` call.
    pub fn fail_next_edit(&self, error: TransportError) {
        self.inner.lock().unwrap().edit_failures.push_back(error);
    }

    /// Queue a failure for the next `delete_copy` call.
    pub fn fail_next_delete(&self, error: TransportError) {
        self.inner.lock().unwrap().delete_failures.push_back(error);
    }

    /// Queue a failure for the next `create_topic` call.
    pub fn fail_next_create_topic(&self, error: TransportError) {
        self.inner
            .lock()
            .unwrap()
            .create_topic_failures
            .push_back(error);
    }

    /// Queue a failure for the next `post_notice` call.
    pub fn fail_next_notice(&self, error: TransportError) {
        self.inner.lock().unwrap().notice_failures.push_back(error);
    }

    /// Queue a failure for the next `pin_message` call.
    pub fn fail_next_pin(&self, error: TransportError) {
        self.inner.lock().unwrap().pin_failures.push_back(error);
    }

    /// All calls recorded so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// The most recent recorded call.
    pub fn last_call(&self) -> Option<TransportCall> {
        self.inner.lock().unwrap().calls.last().cloned()
    }

    /// How many `send_copy` calls were recorded.
    pub fn send_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::SendCopy { .. }))
    }

    /// How many `create_topic` calls were recorded.
    pub fn create_topic_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::CreateTopic { .. }))
    }

    fn count(&self, pred: impl Fn(&TransportCall) -> bool) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| pred(c))
            .count()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_copy(
        &self,
        dest: Destination,
        payload: &Payload,
    ) -> Result<MessageId, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.send_failures.pop_front() {
            return Err(error);
        }

        let assigned = MessageId::new(inner.next_message_id);
        inner.next_message_id += 1;
        inner.calls.push(TransportCall::SendCopy {
            dest,
            payload: payload.clone(),
            assigned,
        });
        Ok(assigned)
    }

    async fn edit_copy(
        &self,
        dest: Destination,
        message_id: MessageId,
        payload: &Payload,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.edit_failures.pop_front() {
            return Err(error);
        }

        inner.calls.push(TransportCall::EditCopy {
            dest,
            message_id,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn delete_copy(
        &self,
        dest: Destination,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.delete_failures.pop_front() {
            return Err(error);
        }

        inner
            .calls
            .push(TransportCall::DeleteCopy { dest, message_id });
        Ok(())
    }

    async fn create_topic(&self, title: &str) -> Result<TopicId, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.create_topic_failures.pop_front() {
            return Err(error);
        }

        let assigned = TopicId::new(inner.next_topic_id);
        inner.next_topic_id += 1;
        inner.calls.push(TransportCall::CreateTopic {
            title: title.to_string(),
            assigned,
        });
        Ok(assigned)
    }

    async fn post_notice(
        &self,
        dest: Destination,
        text: &str,
    ) -> Result<MessageId, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.notice_failures.pop_front() {
            return Err(error);
        }

        let assigned = MessageId::new(inner.next_message_id);
        inner.next_message_id += 1;
        inner.calls.push(TransportCall::PostNotice {
            dest,
            text: text.to_string(),
        });
        Ok(assigned)
    }

    async fn pin_message(
        &self,
        dest: Destination,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.pin_failures.pop_front() {
            return Err(error);
        }

        inner
            .calls
            .push(TransportCall::PinMessage { dest, message_id });
        Ok(())
    }
}
