#![warn(missing_docs)]

//! Warden exchange subsystem: the structured message bus between
//! cooperating bot processes.
//!
//! An ordinary broadcast channel any fleet member can read is turned into
//! a filtered, optionally encrypted, fail-over-capable bus: the codec
//! ([`envelope`]) defines the wire form, [`attachment`] seals bulk payloads
//! carried beside it, and [`channel`] publishes with sticky failover to a
//! hidden secondary channel.

pub mod attachment;
pub mod channel;
pub mod envelope;
pub mod error;

pub use attachment::AttachmentSealer;
pub use channel::{BroadcastChannel, ChannelSelector, Publisher};
pub use envelope::{Envelope, ExchangeAction};
pub use error::{ExchangeError, Result};
