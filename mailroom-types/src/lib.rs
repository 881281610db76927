//! # mailroom-types
//!
//! Foundational types for the mailroom relay: provider-assigned
//! identifiers, relay direction, and the inbound event model shared by
//! all mailroom crates.
//!
//! - [`UserId`], [`TopicId`], [`MessageId`], [`CorrespondenceId`] -
//!   identity newtypes
//! - [`Direction`] - which side a relayed message originated from
//! - [`InboundEvent`], [`Payload`] - the event model fed to the relay

#![warn(missing_docs)]
#![warn(clippy::all)]

mod event;
mod ids;

pub use event::{EventKind, InboundEvent, Payload, PayloadKind, Sender, SourceKind};
pub use ids::{CorrespondenceId, Direction, MessageId, TopicId, UserId};
