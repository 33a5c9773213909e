//! Per-group configuration and cached admin rosters.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use warden_core::types::{GroupId, UserId};

use crate::error::{LedgerError, Result};

/// Warn limits admins may choose from.
pub const WARN_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 2..=5;

/// Which report paths are enabled in a group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMode {
    /// Watcher processes may open reports without a human reporter.
    pub auto: bool,
    /// Members may report each other.
    pub manual: bool,
}

impl Default for ReportMode {
    fn default() -> Self {
        ReportMode {
            auto: false,
            manual: true,
        }
    }
}

/// One group's moderation settings.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// True until an admin customizes anything.
    pub default: bool,
    /// Unix time of the last config change, drives the edit cooldown.
    pub lock_ts: u64,
    /// Purge the offending message when acting on a user.
    pub delete: bool,
    /// Warnings that escalate to a ban.
    pub limit: u32,
    /// Mention the user in moderation notices.
    pub mention: bool,
    /// Enabled report paths.
    pub report: ReportMode,
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            default: true,
            lock_ts: 0,
            delete: true,
            limit: 3,
            mention: true,
            report: ReportMode::default(),
        }
    }
}

impl GroupConfig {
    /// Rejects warn limits outside the accepted range.
    pub fn validate(&self) -> Result<()> {
        if !WARN_LIMIT_RANGE.contains(&self.limit) {
            return Err(LedgerError::InvalidWarnLimit { limit: self.limit });
        }
        Ok(())
    }
}

/// Shared table of group configs and cached admin rosters.
#[derive(Default)]
pub struct GroupRegistry {
    configs: RwLock<HashMap<GroupId, GroupConfig>>,
    admins: RwLock<HashMap<GroupId, HashSet<UserId>>>,
}

impl GroupRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A group's config, defaults if never customized.
    pub fn config(&self, group: GroupId) -> Result<GroupConfig> {
        let configs = self.configs.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(configs.get(&group).copied().unwrap_or_default())
    }

    /// Opens a config session for a group, enforcing the edit cooldown.
    ///
    /// Opening a session stamps the lock so a second session (or a direct
    /// edit) cannot start until the cooldown elapses.
    pub fn begin_session(&self, group: GroupId, now: u64, cooldown: u64) -> Result<()> {
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        let config = configs.entry(group).or_default();
        check_cooldown(config, now, cooldown)?;
        config.lock_ts = now;
        Ok(())
    }

    /// Applies a direct edit, enforcing the cooldown and warn-limit range.
    ///
    /// Returns the config as it stands after the edit.
    pub fn apply_edit(
        &self,
        group: GroupId,
        now: u64,
        cooldown: u64,
        edit: impl FnOnce(&mut GroupConfig),
    ) -> Result<GroupConfig> {
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        let config = configs.entry(group).or_default();
        check_cooldown(config, now, cooldown)?;

        let mut proposed = *config;
        edit(&mut proposed);
        proposed.validate()?;
        proposed.default = false;
        proposed.lock_ts = now;
        *config = proposed;
        Ok(proposed)
    }

    /// Installs a config committed by the fleet's config process.
    ///
    /// The cooldown was enforced when the session opened, so only the
    /// warn limit is validated here.
    pub fn commit(&self, group: GroupId, mut config: GroupConfig, now: u64) -> Result<()> {
        config.validate()?;
        config.default = false;
        config.lock_ts = now;
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        configs.insert(group, config);
        Ok(())
    }

    /// Restores a group to defaults, enforcing the cooldown.
    pub fn reset(&self, group: GroupId, now: u64, cooldown: u64) -> Result<GroupConfig> {
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        let config = configs.entry(group).or_default();
        check_cooldown(config, now, cooldown)?;
        *config = GroupConfig {
            lock_ts: now,
            ..GroupConfig::default()
        };
        Ok(*config)
    }

    /// Forgets a group entirely (bot left or was removed).
    pub fn remove_group(&self, group: GroupId) -> Result<()> {
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        configs.remove(&group);
        drop(configs);
        let mut admins = self.admins.write().map_err(|_| LedgerError::Poisoned)?;
        admins.remove(&group);
        Ok(())
    }

    /// Replaces a group's cached admin roster.
    pub fn set_admins(&self, group: GroupId, roster: HashSet<UserId>) -> Result<()> {
        let mut admins = self.admins.write().map_err(|_| LedgerError::Poisoned)?;
        admins.insert(group, roster);
        Ok(())
    }

    /// Whether a user is a cached admin of a group.
    pub fn is_admin(&self, group: GroupId, user: UserId) -> Result<bool> {
        let admins = self.admins.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(admins.get(&group).is_some_and(|r| r.contains(&user)))
    }

    /// All groups with any cached state.
    pub fn groups(&self) -> Result<Vec<GroupId>> {
        let configs = self.configs.read().map_err(|_| LedgerError::Poisoned)?;
        let admins = self.admins.read().map_err(|_| LedgerError::Poisoned)?;
        let mut out: HashSet<GroupId> = configs.keys().copied().collect();
        out.extend(admins.keys().copied());
        Ok(out.into_iter().collect())
    }

    /// A copy of the config table, for persistence.
    pub fn config_snapshot(&self) -> Result<HashMap<GroupId, GroupConfig>> {
        let configs = self.configs.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(configs.clone())
    }

    /// Replaces the config table, used when loading at startup.
    pub fn replace_configs(&self, table: HashMap<GroupId, GroupConfig>) -> Result<()> {
        let mut configs = self.configs.write().map_err(|_| LedgerError::Poisoned)?;
        *configs = table;
        Ok(())
    }

    /// A copy of the admin table, for persistence.
    pub fn admin_snapshot(&self) -> Result<HashMap<GroupId, HashSet<UserId>>> {
        let admins = self.admins.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(admins.clone())
    }

    /// Replaces the admin table, used when loading at startup.
    pub fn replace_admins(&self, table: HashMap<GroupId, HashSet<UserId>>) -> Result<()> {
        let mut admins = self.admins.write().map_err(|_| LedgerError::Poisoned)?;
        *admins = table;
        Ok(())
    }
}

fn check_cooldown(config: &GroupConfig, now: u64, cooldown: u64) -> Result<()> {
    let elapsed = now.saturating_sub(config.lock_ts);
    if config.lock_ts != 0 && elapsed < cooldown {
        return Err(LedgerError::SessionCooldown {
            remaining: cooldown - elapsed,
        });
    }
    Ok(())
}
