//! Error types for the service layer.

use thiserror::Error;

/// Errors surfaced by service operations.
///
/// Expected outcomes (a contended lock, a rejected report) are modelled
/// as enum results on the operations themselves; these variants are the
/// genuinely exceptional paths.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Ledger state operation failed.
    #[error(transparent)]
    Ledger(#[from] warden_ledger::LedgerError),

    /// Exchange encoding or sealing failed.
    #[error(transparent)]
    Exchange(#[from] warden_exchange::ExchangeError),

    /// Snapshot persistence failed.
    #[error(transparent)]
    State(#[from] warden_state::StateError),

    /// The chat platform refused or failed an operation.
    #[error(transparent)]
    Platform(#[from] crate::platform::PlatformError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
