#![warn(missing_docs)]

//! Warden state persistence: versioned table snapshots on disk.
//!
//! Each in-memory table is persisted as a small versioned JSON snapshot.
//! Every save keeps the previous good snapshot as a backup, and loading
//! falls back to that backup when the primary file is damaged. Losing
//! both copies of an existing table is fatal; operating on silently
//! emptied moderation state would be worse than refusing to start.

pub mod error;
pub mod store;

pub use error::{Result, StateError};
pub use store::{decode_snapshot, StateStore, TableKind, SNAPSHOT_VERSION};
