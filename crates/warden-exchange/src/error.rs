//! Error types for the exchange subsystem.
//!
//! Decode failures are deliberately absent: a malformed inbound broadcast
//! is logged and dropped by the codec, never surfaced as an error.

use thiserror::Error;

/// Errors raised while encoding or sealing outbound exchange traffic.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The attachment key is not a 32-byte hex string.
    #[error("Invalid attachment key: expected 32 bytes, got {actual}")]
    BadKey {
        /// Number of bytes the supplied key decoded to.
        actual: usize,
    },

    /// AEAD sealing or opening failed (wrong key or corrupt blob).
    #[error("Attachment crypto failed")]
    Crypto,

    /// The sealed blob is too short to contain a nonce.
    #[error("Attachment truncated: {len} bytes")]
    Truncated {
        /// Length of the truncated blob.
        len: usize,
    },

    /// Outbound payload could not be serialized.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
