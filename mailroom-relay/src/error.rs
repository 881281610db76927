//! Error types for mailroom-relay.

use mailroom_types::{MessageId, UserId};

/// Main error type for relay operations.
///
/// Everything here is contained at the engine boundary: the event
/// dispatcher logs the failure and moves on, nothing crashes the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Identity store error (includes duplicate-correspondence races).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The sender's topic could not be provisioned; the inbound
    /// message was dropped.
    #[error("topic provisioning failed for user {user}: {source}")]
    TopicProvisionFailed {
        /// The user whose topic was being provisioned.
        user: UserId,
        /// The transport failure behind it.
        source: TransportError,
    },

    /// An edit or deletion referenced a message pair that was never
    /// recorded. Logged, never retried as a new send.
    #[error("no correspondence recorded for message {message_id}")]
    CorrespondenceNotFound {
        /// The message id the event referenced.
        message_id: MessageId,
    },

    /// The retry budget was exhausted on a transient failure; the
    /// relay was dropped and the store left untouched.
    #[error("transport unavailable after {attempts} attempts: {source}")]
    TransportUnavailable {
        /// How many attempts were made.
        attempts: u32,
        /// The last transient error observed.
        source: TransportError,
    },

    /// The transport rejected the call permanently (blocked peer,
    /// malformed request, ...).
    #[error("transport rejected the call: {0}")]
    Transport(TransportError),

    /// The inbound event was internally inconsistent (e.g. a new
    /// message without a payload).
    #[error("malformed inbound event: {reason}")]
    MalformedEvent {
        /// What was wrong with the event.
        reason: &'static str,
    },
}

/// Identity store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A correspondence with the same (side, message id, direction)
    /// key already exists. A race or programming bug; the write was
    /// aborted with no partial state.
    #[error("duplicate correspondence: {detail}")]
    DuplicateCorrespondence {
        /// Which key collided.
        detail: String,
    },

    /// A stored row could not be decoded (unknown direction tag, ...).
    #[error("corrupt row in {table}: {detail}")]
    CorruptRow {
        /// The table the row came from.
        table: &'static str,
        /// What failed to decode.
        detail: String,
    },
}

/// Transport adapter errors.
///
/// Split by retryability: [`TransportError::is_transient`] drives the
/// retry loop, everything else passes through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network-level failure (timeout, connection reset, 5xx).
    #[error("network error: {0}")]
    Network(String),

    /// The provider asked us to slow down.
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited {
        /// How long the provider asked us to wait.
        retry_after: std::time::Duration,
    },

    /// The referenced message no longer exists on the provider.
    #[error("message not found")]
    MessageNotFound,

    /// The destination topic thread no longer exists.
    ///
    /// Distinct from [`TransportError::MessageNotFound`]: this one
    /// triggers stale-topic recovery.
    #[error("topic thread not found")]
    TopicNotFound,

    /// The peer has blocked the operator; delivery is impossible.
    #[error("blocked by peer")]
    Blocked,

    /// Any other permanent rejection from the provider.
    #[error("rejected by provider: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
