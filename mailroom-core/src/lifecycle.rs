//! Correspondence lifecycle state machine.
//!
//! A correspondence moves through three states:
//!
//! ```text
//! Absent ──record──► Active ──delete──► Deleted
//!                      │ ▲                │ ▲
//!                      └─┘ edit           └─┘ delete (idempotent)
//! ```
//!
//! There is no transition out of Deleted, and nothing but the first
//! record leaves Absent. Everything else is a [`TransitionError`].

use std::fmt;

/// The lifecycle state of one correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrespondenceState {
    /// No row has been recorded for this message pair.
    Absent,
    /// Recorded and relayable: edits and deletes act on it.
    Active,
    /// Soft-deleted. The row is retained but no longer relayable.
    Deleted,
}

impl CorrespondenceState {
    /// Reconstruct the state from a stored row's deleted flag.
    pub fn from_deleted_flag(deleted: bool) -> Self {
        if deleted {
            Self::Deleted
        } else {
            Self::Active
        }
    }

    /// Apply a lifecycle event, returning the next state.
    pub fn on_event(self, event: LifecycleEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (Self::Absent, LifecycleEvent::Record) => Ok(Self::Active),
            (Self::Active, LifecycleEvent::Edit) => Ok(Self::Active),
            (Self::Active, LifecycleEvent::Delete) => Ok(Self::Deleted),
            // Deleting twice settles in Deleted without error.
            (Self::Deleted, LifecycleEvent::Delete) => Ok(Self::Deleted),
            (from, event) => Err(TransitionError { from, event }),
        }
    }
}

/// Events that drive the correspondence lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The first successful relay recorded the pair.
    Record,
    /// One side edited its message in place.
    Edit,
    /// One side deleted its message.
    Delete,
}

/// An event arrived that the current state has no transition for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no transition for {event:?} from {from:?}")]
pub struct TransitionError {
    /// The state the correspondence was in.
    pub from: CorrespondenceState,
    /// The event that had no transition.
    pub event: LifecycleEvent,
}

impl fmt::Display for CorrespondenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Active => f.write_str("active"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}
