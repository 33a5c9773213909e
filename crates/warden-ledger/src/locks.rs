//! Advisory pair locks over (user, group).
//!
//! A lock is held for the duration of one moderation action and released
//! when the guard drops, including on early return and panic unwind.
//! Acquisition never blocks: a contended pair is reported to the caller,
//! who answers the admin instead of queueing behind the other action.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use warden_core::types::{GroupId, UserId};

type LockKey = (UserId, GroupId);

/// Non-blocking advisory lock table keyed by (user, group).
#[derive(Clone, Default)]
pub struct PairLockManager {
    held: Arc<DashMap<LockKey, ()>>,
}

impl PairLockManager {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to lock one (user, group) pair.
    ///
    /// Returns `None` if another guard currently holds the pair.
    pub fn try_acquire(&self, user: UserId, group: GroupId) -> Option<PairLockGuard> {
        let key = (user, group);
        if self.held.insert(key, ()).is_some() {
            return None;
        }
        trace!(%user, %group, "pair lock acquired");
        Some(PairLockGuard {
            held: Arc::clone(&self.held),
            key,
        })
    }

    /// Attempts to lock two users in the same group, both or neither.
    ///
    /// Used when resolving a report: the reporter and the reportee must
    /// both be quiescent before the verdict is applied. On partial
    /// failure the first lock is released before returning.
    pub fn try_acquire_pair(
        &self,
        first: UserId,
        second: UserId,
        group: GroupId,
    ) -> Option<(PairLockGuard, PairLockGuard)> {
        let a = self.try_acquire(first, group)?;
        match self.try_acquire(second, group) {
            Some(b) => Some((a, b)),
            None => {
                drop(a);
                None
            }
        }
    }

    /// Whether a pair is currently locked.
    pub fn is_held(&self, user: UserId, group: GroupId) -> bool {
        self.held.contains_key(&(user, group))
    }
}

/// Releases its (user, group) pair on drop.
pub struct PairLockGuard {
    held: Arc<DashMap<LockKey, ()>>,
    key: LockKey,
}

impl Drop for PairLockGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
        trace!(user = %self.key.0, group = %self.key.1, "pair lock released");
    }
}
