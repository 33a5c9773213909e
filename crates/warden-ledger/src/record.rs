//! Per-user moderation records and the fleet-wide bad set.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use warden_core::types::{GroupId, UserId};

use crate::error::{LedgerError, Result};

/// Score contributions keyed by the lowercase name of the process that
/// published them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreCard(HashMap<String, f64>);

impl ScoreCard {
    /// Records a source's contribution, replacing any previous value.
    pub fn set(&mut self, source: impl Into<String>, score: f64) {
        self.0.insert(source.into(), score);
    }

    /// A source's current contribution, zero if it never published one.
    pub fn get(&self, source: &str) -> f64 {
        self.0.get(source).copied().unwrap_or(0.0)
    }

    /// Drops a source's contribution, letting clean records prune.
    pub fn clear(&mut self, source: &str) {
        self.0.remove(source);
    }

    /// Sum of all contributions.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

/// Everything this process knows about one user.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModerationRecord {
    /// Groups the user is banned from.
    pub banned: HashSet<GroupId>,
    /// Groups the user was kicked from (cleared if they rejoin).
    pub kicked: HashSet<GroupId>,
    /// Outstanding warning count per group.
    pub warnings: HashMap<GroupId, u32>,
    /// Score contributions from across the fleet.
    pub scores: ScoreCard,
    /// Groups with an unresolved report against this user.
    pub waiting: HashSet<GroupId>,
}

impl ModerationRecord {
    /// True when the record carries no state at all.
    pub fn is_clean(&self) -> bool {
        self.banned.is_empty()
            && self.kicked.is_empty()
            && self.warnings.is_empty()
            && self.waiting.is_empty()
            && self.scores == ScoreCard::default()
    }

    /// Total outstanding warnings across all groups.
    pub fn total_warnings(&self) -> u32 {
        self.warnings.values().sum()
    }
}

/// Shared table of per-user moderation records.
///
/// Records materialize lazily on first mutation; reading a user that was
/// never touched yields a default record without creating one.
#[derive(Default)]
pub struct Ledger {
    records: RwLock<HashMap<UserId, ModerationRecord>>,
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the user's record, default if none exists.
    pub fn get(&self, user: UserId) -> Result<ModerationRecord> {
        let records = self.records.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(records.get(&user).cloned().unwrap_or_default())
    }

    /// Mutates the user's record in place, creating it if needed.
    pub fn modify<R>(
        &self,
        user: UserId,
        f: impl FnOnce(&mut ModerationRecord) -> R,
    ) -> Result<R> {
        let mut records = self.records.write().map_err(|_| LedgerError::Poisoned)?;
        let record = records.entry(user).or_default();
        let out = f(record);
        if record.is_clean() {
            records.remove(&user);
        }
        Ok(out)
    }

    /// Drops the user's record entirely.
    pub fn reset(&self, user: UserId) -> Result<()> {
        let mut records = self.records.write().map_err(|_| LedgerError::Poisoned)?;
        records.remove(&user);
        Ok(())
    }

    /// A copy of the full table, for persistence.
    pub fn snapshot(&self) -> Result<HashMap<UserId, ModerationRecord>> {
        let records = self.records.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(records.clone())
    }

    /// Replaces the full table, used when loading at startup.
    pub fn replace(&self, table: HashMap<UserId, ModerationRecord>) -> Result<()> {
        let mut records = self.records.write().map_err(|_| LedgerError::Poisoned)?;
        *records = table;
        Ok(())
    }
}

/// Fleet-wide set of users flagged as bad actors.
#[derive(Default)]
pub struct BadIds {
    users: RwLock<HashSet<UserId>>,
}

impl BadIds {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a user is flagged.
    pub fn contains(&self, user: UserId) -> Result<bool> {
        let users = self.users.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(users.contains(&user))
    }

    /// Flags a user. Returns false if they were already flagged.
    pub fn insert(&self, user: UserId) -> Result<bool> {
        let mut users = self.users.write().map_err(|_| LedgerError::Poisoned)?;
        Ok(users.insert(user))
    }

    /// Unflags a user. Returns false if they were not flagged.
    pub fn remove(&self, user: UserId) -> Result<bool> {
        let mut users = self.users.write().map_err(|_| LedgerError::Poisoned)?;
        Ok(users.remove(&user))
    }

    /// A copy of the full set, for persistence.
    pub fn snapshot(&self) -> Result<HashSet<UserId>> {
        let users = self.users.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(users.clone())
    }

    /// Replaces the full set, used when loading at startup.
    pub fn replace(&self, set: HashSet<UserId>) -> Result<()> {
        let mut users = self.users.write().map_err(|_| LedgerError::Poisoned)?;
        *users = set;
        Ok(())
    }
}
