//! Moderation actions against a single (user, group) pair.
//!
//! Every public entry point takes the pair lock first; a contended pair
//! reports [`ModOutcome::Contended`] instead of queueing. The `apply_*`
//! variants assume the caller already holds the pair lock (report
//! resolution holds locks for both parties before applying a verdict).
//!
//! Evidence handling is strict: when an action carries an offending
//! message, that message is archived to the log channel *before* any
//! count changes. If archiving fails the action does not happen.

use serde_json::json;
use tracing::{debug, warn};

use warden_core::types::{GroupId, MessageRef, UserId};
use warden_exchange::{Envelope, ExchangeAction};
use warden_ledger::score;

use crate::error::Result;
use crate::service::WardenService;

/// What a moderation action did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModOutcome {
    /// Warning recorded; the user now holds `count` of `limit`.
    Warned {
        /// Outstanding warnings in this group after the action.
        count: u32,
        /// The group's escalation limit.
        limit: u32,
    },
    /// The warning crossed the group limit and became a ban.
    Escalated,
    /// The user is now banned from the group.
    Banned,
    /// The user was already banned; nothing changed.
    AlreadyBanned,
    /// The user was removed but may rejoin.
    Kicked,
    /// The ban was lifted.
    Unbanned,
    /// Unban requested for a user who was not banned.
    NotBanned,
    /// One warning removed; `remaining` are left in this group.
    Unwarned {
        /// Warnings left in this group after the action.
        remaining: u32,
    },
    /// The user's standing in the group was cleared.
    Forgiven,
    /// There was nothing to undo or forgive.
    NothingToUndo,
    /// Another action holds this (user, group) pair right now.
    Contended,
}

impl WardenService {
    /// Warns a user, escalating to a ban at the group limit.
    ///
    /// `reason` is free text quoted in the debug trace and, for report
    /// verdicts, carried over from the report session.
    pub async fn warn(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_warn(group, user, evidence, reason).await
    }

    /// Bans a user from a group.
    pub async fn ban(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_ban(group, user, evidence, reason).await
    }

    /// Removes a user from a group without a standing ban.
    pub async fn kick(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_kick(group, user, evidence, reason).await
    }

    /// Lifts a ban.
    pub async fn unban(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_unban(group, user).await
    }

    /// Removes one warning.
    pub async fn unwarn(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_unwarn(group, user).await
    }

    /// Clears a user's standing in a group: warnings, pending reports,
    /// and any ban.
    pub async fn forgive(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let Some(_guard) = self.locks.try_acquire(user, group) else {
            return Ok(ModOutcome::Contended);
        };
        self.apply_forgive(group, user).await
    }

    /// Clears removal state when a user rejoins a group.
    ///
    /// A rejoin means the platform let them back in, so any stale kick
    /// or ban marker for that group no longer reflects reality.
    pub async fn member_rejoined(&self, group: GroupId, user: UserId) -> Result<()> {
        let had_state = self.ledger.modify(user, |r| {
            r.kicked.remove(&group) | r.banned.remove(&group)
        })?;
        if had_state {
            debug!(%user, %group, "user rejoined, removal state cleared");
            self.refresh_score(user).await?;
        }
        Ok(())
    }

    pub(crate) async fn apply_warn(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let record = self.ledger.get(user)?;
        if record.banned.contains(&group) {
            return Ok(ModOutcome::AlreadyBanned);
        }

        self.forward_evidence(group, evidence).await?;
        let config = self.groups.config(group)?;
        let count = self.ledger.modify(user, |r| {
            let count = r.warnings.entry(group).or_insert(0);
            *count += 1;
            *count
        })?;

        if config.delete {
            self.purge_in_group(group, evidence).await;
        }

        if count >= config.limit {
            // Evidence is already archived; the ban must not count it twice.
            let outcome = self.apply_ban(group, user, None, reason).await?;
            return Ok(match outcome {
                ModOutcome::Banned => ModOutcome::Escalated,
                other => other,
            });
        }

        self.debug_trace("warn", group, user, reason).await;
        self.refresh_score(user).await?;
        Ok(ModOutcome::Warned {
            count,
            limit: config.limit,
        })
    }

    pub(crate) async fn apply_ban(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let record = self.ledger.get(user)?;
        if record.banned.contains(&group) {
            return Ok(ModOutcome::AlreadyBanned);
        }

        self.forward_evidence(group, evidence).await?;
        self.platform.ban_member(group, user).await?;
        self.ledger.modify(user, |r| {
            r.warnings.remove(&group);
            r.banned.insert(group);
        })?;

        let config = self.groups.config(group)?;
        if config.delete {
            self.purge_in_group(group, evidence).await;
            self.publish_help(ExchangeAction::HelpDelete, group, user)
                .await?;
        }
        if self.bad.contains(user)? {
            // Fleet-flagged bad actor: ask the manager to ban everywhere.
            self.publish_help(ExchangeAction::HelpBan, group, user)
                .await?;
        }

        self.debug_trace("ban", group, user, reason).await;
        self.refresh_score(user).await?;
        Ok(ModOutcome::Banned)
    }

    pub(crate) async fn apply_kick(
        &self,
        group: GroupId,
        user: UserId,
        evidence: Option<MessageRef>,
        reason: Option<&str>,
    ) -> Result<ModOutcome> {
        let record = self.ledger.get(user)?;
        if record.banned.contains(&group) {
            return Ok(ModOutcome::AlreadyBanned);
        }

        self.forward_evidence(group, evidence).await?;
        self.platform.kick_member(group, user).await?;
        self.ledger.modify(user, |r| {
            r.kicked.insert(group);
        })?;

        if self.groups.config(group)?.delete {
            self.purge_in_group(group, evidence).await;
        }

        self.debug_trace("kick", group, user, reason).await;
        self.refresh_score(user).await?;
        Ok(ModOutcome::Kicked)
    }

    pub(crate) async fn apply_unban(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let record = self.ledger.get(user)?;
        if !record.banned.contains(&group) {
            return Ok(ModOutcome::NotBanned);
        }

        self.platform.unban_member(group, user).await?;
        self.ledger.modify(user, |r| {
            r.banned.remove(&group);
        })?;
        self.debug_trace("unban", group, user, None).await;
        self.refresh_score(user).await?;
        Ok(ModOutcome::Unbanned)
    }

    pub(crate) async fn apply_unwarn(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let remaining = self.ledger.modify(user, |r| match r.warnings.get_mut(&group) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Some(*count)
            }
            Some(_) => {
                r.warnings.remove(&group);
                Some(0)
            }
            None => None,
        })?;

        match remaining {
            Some(remaining) => {
                self.debug_trace("unwarn", group, user, None).await;
                self.refresh_score(user).await?;
                Ok(ModOutcome::Unwarned { remaining })
            }
            None => Ok(ModOutcome::NothingToUndo),
        }
    }

    pub(crate) async fn apply_forgive(&self, group: GroupId, user: UserId) -> Result<ModOutcome> {
        let record = self.ledger.get(user)?;
        let was_banned = record.banned.contains(&group);
        let had_state = was_banned
            || record.warnings.contains_key(&group)
            || record.waiting.contains(&group);
        if !had_state {
            return Ok(ModOutcome::NothingToUndo);
        }

        if was_banned {
            self.platform.unban_member(group, user).await?;
        }
        self.ledger.modify(user, |r| {
            r.warnings.remove(&group);
            r.waiting.remove(&group);
            r.banned.remove(&group);
        })?;
        self.debug_trace("forgive", group, user, None).await;
        self.refresh_score(user).await?;
        Ok(ModOutcome::Forgiven)
    }

    /// Recomputes this process's score contribution for a user, persists
    /// it, and republishes it to the fleet.
    pub(crate) async fn refresh_score(&self, user: UserId) -> Result<f64> {
        let source = self.config.process_id.source_key();
        let weights = self.config.score_weights;
        let score = self.ledger.modify(user, |r| {
            let score = score::recompute(r, &weights);
            if score == 0.0 {
                r.scores.clear(&source);
            } else {
                r.scores.set(source.clone(), score);
            }
            score
        })?;
        self.persist_ledger()?;

        let envelope = Envelope::new(
            self.config.process_id.clone(),
            self.config.score_receivers.clone(),
            ExchangeAction::UpdateScore,
            json!({"id": user.as_u64(), "score": score}),
        );
        self.publisher.publish(&envelope).await?;
        Ok(score)
    }

    pub(crate) async fn publish_help(
        &self,
        action: ExchangeAction,
        group: GroupId,
        user: UserId,
    ) -> Result<()> {
        let envelope = Envelope::new(
            self.config.process_id.clone(),
            self.config.help_receivers.clone(),
            action,
            json!({"group_id": group.as_i64(), "user_id": user.as_u64()}),
        );
        self.publisher.publish(&envelope).await?;
        Ok(())
    }

    /// Best-effort action trace to the debug channel; trace delivery
    /// never fails the action itself.
    async fn debug_trace(&self, action: &str, group: GroupId, user: UserId, reason: Option<&str>) {
        let text = match reason {
            Some(reason) => format!("{action}: user {user} in group {group} ({reason})"),
            None => format!("{action}: user {user} in group {group}"),
        };
        if let Err(e) = self
            .platform
            .send_channel_message(self.config.debug_channel, &text)
            .await
        {
            warn!(%group, error = %e, "could not post debug trace");
        }
    }

    async fn forward_evidence(
        &self,
        group: GroupId,
        evidence: Option<MessageRef>,
    ) -> Result<Option<MessageRef>> {
        let Some(message) = evidence else {
            return Ok(None);
        };
        let archived = self
            .platform
            .forward_message(group, message, self.config.log_channel)
            .await?;
        Ok(Some(archived))
    }

    /// Best-effort deletion of the offending message in the group. The
    /// archived copy in the log channel is the durable one.
    async fn purge_in_group(&self, group: GroupId, evidence: Option<MessageRef>) {
        if let Some(message) = evidence {
            if let Err(e) = self.platform.delete_messages(group, &[message]).await {
                warn!(%group, error = %e, "could not delete offending message");
            }
        }
    }
}
