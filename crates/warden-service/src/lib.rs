#![warn(missing_docs)]

//! Warden service: the async layer that turns ledger state, the exchange
//! bus, and a chat platform into a running moderation process.
//!
//! The crate is platform-agnostic: a binary supplies implementations of
//! [`platform::PlatformClient`] and
//! [`warden_exchange::BroadcastChannel`] for its chat platform and hands
//! them to [`service::WardenService`].

pub mod commands;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod moderator;
pub mod platform;
pub mod reports;
pub mod service;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testutil;

pub use commands::Command;
pub use error::{Result, ServiceError};
pub use moderator::ModOutcome;
pub use platform::{ChatAdmin, PlatformClient, PlatformError};
pub use reports::{ReportOutcome, ReportRejection, ResolveOutcome, Verdict};
pub use service::WardenService;
