//! Newtype identifiers shared across the Warden crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a chat-platform user account.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Sentinel id used when an operation was triggered by the system
    /// rather than a real user (e.g. auto reports).
    pub const SYSTEM: UserId = UserId(0);

    /// Creates a new UserId from a raw u64 value.
    pub const fn new(id: u64) -> Self {
        UserId(id)
    }

    /// Returns the raw u64 value of this user id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true if this is the system sentinel.
    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a group chat the bot moderates.
///
/// Group ids are negative on the platform this core was written for, so
/// the raw value is signed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(i64);

impl GroupId {
    /// Creates a new GroupId from a raw i64 value.
    pub const fn new(id: i64) -> Self {
        GroupId(id)
    }

    /// Returns the raw i64 value of this group id.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a broadcast or logging channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(i64);

impl ChannelId {
    /// Creates a new ChannelId from a raw i64 value.
    pub const fn new(id: i64) -> Self {
        ChannelId(id)
    }

    /// Returns the raw i64 value of this channel id.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true if this channel id was never configured.
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a message within a group or channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageRef(u64);

impl MessageRef {
    /// Creates a new MessageRef from a raw u64 value.
    pub const fn new(id: u64) -> Self {
        MessageRef(id)
    }

    /// Returns the raw u64 value of this message reference.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a cooperating bot process on the exchange channel.
///
/// The fleet vocabulary is open-ended (newer fleet members may introduce
/// names this process has never seen), so this is a string newtype rather
/// than an enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Creates a new ProcessId from a process name.
    pub fn new(name: impl Into<String>) -> Self {
        ProcessId(name.into())
    }

    /// Returns the process name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lowercase form used as a score-card source key.
    pub fn source_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
