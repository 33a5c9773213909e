#![warn(missing_docs)]

//! Warden ledger: the moderation state the rest of the system acts on.
//!
//! Everything here is synchronous, in-memory, and safe to share across
//! tasks. Mutation of a user's standing in a group goes through the pair
//! locks in [`locks`]; the async layers above decide what to do while a
//! lock is held, this crate only guarantees that two actors never edit
//! the same (user, group) pair at once.

pub mod error;
pub mod group;
pub mod locks;
pub mod record;
pub mod report;
pub mod score;

pub use error::{LedgerError, Result};
pub use group::{GroupConfig, GroupRegistry, ReportMode};
pub use locks::{PairLockGuard, PairLockManager};
pub use record::{BadIds, Ledger, ModerationRecord, ScoreCard};
pub use report::{ReportBoard, ReportSession, SessionState};
