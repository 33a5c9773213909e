#![warn(missing_docs)]

//! Warden shared core: identifiers, process configuration, time helpers.

pub mod config;
pub mod time;
pub mod types;

pub use config::WardenConfig;
pub use types::{ChannelId, GroupId, MessageRef, ProcessId, UserId};
