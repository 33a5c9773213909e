//! Error types for the persistence subsystem.

use thiserror::Error;

/// Errors raised while loading or saving table snapshots.
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem failure while reading or writing a snapshot.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A table could not be serialized for writing.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Both the primary snapshot and its backup are unreadable.
    ///
    /// Fatal at startup: the process must not run with silently emptied
    /// moderation state.
    #[error("Table '{table}' is corrupt and no usable backup exists")]
    Corrupt {
        /// Name of the damaged table.
        table: &'static str,
    },
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, StateError>;
