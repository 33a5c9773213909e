//! Error types for ledger operations.

use thiserror::Error;

/// Errors raised by ledger state operations.
///
/// Lock contention is deliberately not an error: `try_acquire` reports it
/// through its return value and callers answer the admin instead.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A config session was requested before the cooldown elapsed.
    #[error("Config session cooldown active, {remaining}s remaining")]
    SessionCooldown {
        /// Seconds until a new session may open.
        remaining: u64,
    },

    /// A proposed warn limit is outside the accepted range.
    #[error("Warn limit {limit} out of range (2..=5)")]
    InvalidWarnLimit {
        /// The rejected limit.
        limit: u32,
    },

    /// No report session exists for the given token.
    #[error("Unknown report token")]
    ReportNotFound,

    /// The report session was already claimed by another admin.
    #[error("Report already claimed")]
    ReportClaimed,

    /// A shared lock was poisoned by a panicking writer.
    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
