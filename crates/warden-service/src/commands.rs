//! The in-group command surface.
//!
//! The platform binary parses nothing itself: it hands raw command text
//! (and, for reply commands, the replied-to user and message) to
//! [`WardenService::handle_command`], which answers in the group and
//! returns the reply text. Expected refusals (not an admin, cooldown,
//! contended pair) become replies, never errors.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use warden_core::time::unix_now;
use warden_core::types::{GroupId, MessageRef, UserId};
use warden_exchange::{Envelope, ExchangeAction};
use warden_ledger::LedgerError;

use crate::error::{Result, ServiceError};
use crate::moderator::ModOutcome;
use crate::reports::{ReportOutcome, ReportRejection, ResolveOutcome, Verdict};
use crate::service::WardenService;

/// A parsed in-group command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Warn the replied-to user.
    Warn {
        /// Free text after the command word.
        reason: Option<String>,
    },
    /// Ban the replied-to user.
    Ban {
        /// Free text after the command word.
        reason: Option<String>,
    },
    /// Kick the replied-to user.
    Kick {
        /// Free text after the command word.
        reason: Option<String>,
    },
    /// Lift the replied-to user's ban.
    Unban,
    /// Remove one warning from the replied-to user.
    Undo,
    /// Clear the replied-to user's standing in this group.
    Forgive,
    /// Report the replied-to user (member command).
    Report {
        /// Free text after the command word.
        reason: Option<String>,
    },
    /// Resolve a report token with a verdict.
    Resolve {
        /// The report token.
        token: String,
        /// The verdict to apply.
        verdict: Verdict,
    },
    /// Open an interactive config session with the fleet config process.
    ConfigSession,
    /// Show the group's current settings.
    ConfigShow,
    /// Restore the group's settings to defaults.
    ConfigDefault,
    /// Toggle message deletion.
    ConfigDelete(bool),
    /// Toggle user mentions in notices.
    ConfigMention(bool),
    /// Set the warn limit.
    ConfigLimit(u32),
    /// Set the enabled report paths.
    ConfigReport {
        /// Allow automatic reports from watcher processes.
        auto: bool,
        /// Allow members to report each other.
        manual: bool,
    },
}

/// Parses command text. Returns `None` for anything that is not a
/// command this process owns.
pub fn parse(text: &str) -> Option<Command> {
    let mut words = text.split_whitespace();
    let head = words.next()?;
    // Strip an addressed suffix like /warn@some_bot.
    let head = head.split('@').next().unwrap_or(head);

    let command = match head {
        "/warn" => Command::Warn {
            reason: trailing(words),
        },
        "/ban" => Command::Ban {
            reason: trailing(words),
        },
        "/kick" => Command::Kick {
            reason: trailing(words),
        },
        "/unban" => Command::Unban,
        "/undo" => Command::Undo,
        "/forgive" => Command::Forgive,
        "/report" => Command::Report {
            reason: trailing(words),
        },
        "/resolve" => {
            let token = words.next()?.to_string();
            let verdict = match words.next()? {
                "ban" => Verdict::Ban,
                "warn" => Verdict::Warn,
                "innocent" => Verdict::Innocent,
                "abuse" => Verdict::Abuse,
                _ => return None,
            };
            Command::Resolve { token, verdict }
        }
        "/config" => match words.next() {
            None => Command::ConfigSession,
            Some("show") => Command::ConfigShow,
            Some("default") => Command::ConfigDefault,
            Some("delete") => Command::ConfigDelete(parse_switch(words.next()?)?),
            Some("mention") => Command::ConfigMention(parse_switch(words.next()?)?),
            Some("limit") => Command::ConfigLimit(words.next()?.parse().ok()?),
            Some("report") => match words.next()? {
                "auto" => Command::ConfigReport {
                    auto: true,
                    manual: false,
                },
                "manual" => Command::ConfigReport {
                    auto: false,
                    manual: true,
                },
                "both" => Command::ConfigReport {
                    auto: true,
                    manual: true,
                },
                "off" => Command::ConfigReport {
                    auto: false,
                    manual: false,
                },
                _ => return None,
            },
            Some(_) => return None,
        },
        _ => return None,
    };
    Some(command)
}

fn trailing<'a>(words: impl Iterator<Item = &'a str>) -> Option<String> {
    let rest = words.collect::<Vec<_>>().join(" ");
    (!rest.is_empty()).then_some(rest)
}

fn parse_switch(word: &str) -> Option<bool> {
    match word {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Undo button payload attached to warn/ban notices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoToken {
    /// Always `"undo"` on the wire.
    #[serde(rename = "a")]
    pub action: String,
    /// `"ban"` or `"warn"`.
    #[serde(rename = "t")]
    pub kind: String,
    /// The affected user.
    #[serde(rename = "d")]
    pub user: UserId,
}

impl UndoToken {
    /// Builds a ban-undo payload.
    pub fn ban(user: UserId) -> Self {
        UndoToken {
            action: "undo".into(),
            kind: "ban".into(),
            user,
        }
    }

    /// Builds a warn-undo payload.
    pub fn warn(user: UserId) -> Self {
        UndoToken {
            action: "undo".into(),
            kind: "warn".into(),
            user,
        }
    }

    /// Parses a callback payload, `None` if it is not an undo.
    pub fn decode(raw: &str) -> Option<Self> {
        let token: UndoToken = serde_json::from_str(raw).ok()?;
        (token.action == "undo").then_some(token)
    }

    /// Serializes for a callback button.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self).map_err(warden_exchange::ExchangeError::Encode)?)
    }
}

impl WardenService {
    /// Executes a command, answers in the group, and returns the reply.
    ///
    /// `target` is the replied-to user and message for reply commands.
    pub async fn handle_command(
        &self,
        group: GroupId,
        sender: UserId,
        target: Option<(UserId, MessageRef)>,
        command: Command,
    ) -> Result<String> {
        let admin_only = !matches!(command, Command::Report { .. });
        if admin_only && !self.groups.is_admin(group, sender)? {
            return self.reply(group, "Admins only.").await;
        }

        info!(%group, %sender, ?command, "command received");
        match command {
            Command::Warn { reason } => {
                let Some((user, message)) = target else {
                    return self.reply(group, "Reply to a message to warn its sender.").await;
                };
                let outcome = self
                    .warn(group, user, Some(message), reason.as_deref())
                    .await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Ban { reason } => {
                let Some((user, message)) = target else {
                    return self.reply(group, "Reply to a message to ban its sender.").await;
                };
                let outcome = self
                    .ban(group, user, Some(message), reason.as_deref())
                    .await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Kick { reason } => {
                let Some((user, message)) = target else {
                    return self.reply(group, "Reply to a message to kick its sender.").await;
                };
                let outcome = self
                    .kick(group, user, Some(message), reason.as_deref())
                    .await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Unban => {
                let Some((user, _)) = target else {
                    return self.reply(group, "Reply to a message from the banned user.").await;
                };
                let outcome = self.unban(group, user).await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Undo => {
                let Some((user, _)) = target else {
                    return self.reply(group, "Reply to a message to undo a warning.").await;
                };
                let outcome = self.unwarn(group, user).await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Forgive => {
                let Some((user, _)) = target else {
                    return self.reply(group, "Reply to a message to forgive its sender.").await;
                };
                let outcome = self.forgive(group, user).await?;
                self.reply_outcome(group, user, outcome).await
            }
            Command::Report { reason } => {
                let Some((user, message)) = target else {
                    return self.reply(group, "Reply to the offending message to report it.").await;
                };
                let outcome = self
                    .open_report(group, sender, user, Some(message), reason)
                    .await?;
                let text = match outcome {
                    ReportOutcome::Opened { .. } => "Report filed, admins notified.".to_string(),
                    ReportOutcome::Rejected(reason) => rejection_text(reason).to_string(),
                };
                self.reply(group, &text).await
            }
            Command::Resolve { token, verdict } => {
                let outcome = match self.resolve_report(&token, verdict).await {
                    Ok(outcome) => outcome,
                    Err(ServiceError::Ledger(LedgerError::ReportNotFound)) => {
                        return self.reply(group, "No open report with that token.").await;
                    }
                    Err(e) => return Err(e),
                };
                let text = match outcome {
                    ResolveOutcome::Applied(applied) if verdict == Verdict::Abuse => {
                        format!("Reporter {}", outcome_text(applied))
                    }
                    ResolveOutcome::Applied(applied) => outcome_text(applied),
                    ResolveOutcome::Dismissed => "Report dismissed.".to_string(),
                    ResolveOutcome::Busy => {
                        "Report is being handled elsewhere, try again shortly.".to_string()
                    }
                };
                self.reply(group, &text).await
            }
            Command::ConfigSession => self.open_config_session(group, sender).await,
            Command::ConfigShow => {
                let config = self.groups.config(group)?;
                let text = format!(
                    "Settings: delete {}, mention {}, warn limit {}, reports auto {} manual {}{}",
                    switch(config.delete),
                    switch(config.mention),
                    config.limit,
                    switch(config.report.auto),
                    switch(config.report.manual),
                    if config.default { " (defaults)" } else { "" },
                );
                self.reply(group, &text).await
            }
            Command::ConfigDefault => {
                self.edit_config_reply(group, |registry, now, cooldown| {
                    registry.reset(group, now, cooldown)
                })
                .await
            }
            Command::ConfigDelete(value) => {
                self.edit_config_reply(group, |registry, now, cooldown| {
                    registry.apply_edit(group, now, cooldown, |c| c.delete = value)
                })
                .await
            }
            Command::ConfigMention(value) => {
                self.edit_config_reply(group, |registry, now, cooldown| {
                    registry.apply_edit(group, now, cooldown, |c| c.mention = value)
                })
                .await
            }
            Command::ConfigLimit(limit) => {
                self.edit_config_reply(group, |registry, now, cooldown| {
                    registry.apply_edit(group, now, cooldown, |c| c.limit = limit)
                })
                .await
            }
            Command::ConfigReport { auto, manual } => {
                self.edit_config_reply(group, |registry, now, cooldown| {
                    registry.apply_edit(group, now, cooldown, |c| {
                        c.report.auto = auto;
                        c.report.manual = manual;
                    })
                })
                .await
            }
        }
    }

    /// Handles an undo button press on a warn/ban notice.
    pub async fn handle_undo(
        &self,
        group: GroupId,
        sender: UserId,
        token: &UndoToken,
    ) -> Result<String> {
        if !self.groups.is_admin(group, sender)? {
            return self.reply(group, "Admins only.").await;
        }
        let outcome = match token.kind.as_str() {
            "ban" => self.unban(group, token.user).await?,
            "warn" => self.unwarn(group, token.user).await?,
            _ => return self.reply(group, "Nothing to undo.").await,
        };
        self.reply_outcome(group, token.user, outcome).await
    }

    async fn open_config_session(&self, group: GroupId, sender: UserId) -> Result<String> {
        let now = unix_now();
        match self
            .groups
            .begin_session(group, now, self.config.config_cooldown_secs)
        {
            Ok(()) => {}
            Err(LedgerError::SessionCooldown { remaining }) => {
                return self
                    .reply(group, &format!("Settings were just changed, wait {remaining}s."))
                    .await;
            }
            Err(e) => return Err(e.into()),
        }
        self.persist_configs()?;

        let envelope = Envelope::new(
            self.config.process_id.clone(),
            self.config.help_receivers.clone(),
            ExchangeAction::ConfigAsk,
            json!({
                "group_id": group.as_i64(),
                "user_id": sender.as_u64(),
                "config": self.groups.config(group)?,
            }),
        );
        self.publisher.publish(&envelope).await?;
        self.reply(group, "Config session opened, follow the link you receive.")
            .await
    }

    async fn edit_config_reply(
        &self,
        group: GroupId,
        edit: impl FnOnce(
            &warden_ledger::GroupRegistry,
            u64,
            u64,
        ) -> warden_ledger::Result<warden_ledger::GroupConfig>,
    ) -> Result<String> {
        let now = unix_now();
        match edit(&self.groups, now, self.config.config_cooldown_secs) {
            Ok(_) => {
                self.persist_configs()?;
                self.reply(group, "Settings updated.").await
            }
            Err(LedgerError::SessionCooldown { remaining }) => {
                self.reply(group, &format!("Settings were just changed, wait {remaining}s."))
                    .await
            }
            Err(LedgerError::InvalidWarnLimit { limit }) => {
                self.reply(group, &format!("Warn limit {limit} is out of range (2-5)."))
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reply_outcome(
        &self,
        group: GroupId,
        user: UserId,
        outcome: ModOutcome,
    ) -> Result<String> {
        let mention = self.groups.config(group)?.mention;
        let subject = if mention {
            format!("User {user}")
        } else {
            "The user".to_string()
        };
        // Warn and ban notices carry an undo button for the admins.
        let undo = match &outcome {
            ModOutcome::Warned { .. } => Some(UndoToken::warn(user)),
            ModOutcome::Banned | ModOutcome::Escalated => Some(UndoToken::ban(user)),
            _ => None,
        };
        let text = match outcome {
            ModOutcome::Warned { count, limit } => {
                format!("{subject} warned ({count}/{limit}).")
            }
            ModOutcome::Escalated => format!("{subject} reached the warn limit and was banned."),
            other => format!("{subject}: {}", outcome_text(other)),
        };
        match undo {
            Some(token) => {
                let payload = token.encode()?;
                self.platform
                    .send_message_with_button(group, &text, &payload)
                    .await?;
                Ok(text)
            }
            None => self.reply(group, &text).await,
        }
    }

    async fn reply(&self, group: GroupId, text: &str) -> Result<String> {
        self.platform.send_message(group, text).await?;
        Ok(text.to_string())
    }
}

fn outcome_text(outcome: ModOutcome) -> String {
    match outcome {
        ModOutcome::Warned { count, limit } => format!("warned ({count}/{limit})."),
        ModOutcome::Escalated => "reached the warn limit and was banned.".to_string(),
        ModOutcome::Banned => "banned.".to_string(),
        ModOutcome::AlreadyBanned => "already banned.".to_string(),
        ModOutcome::Kicked => "kicked.".to_string(),
        ModOutcome::Unbanned => "unbanned.".to_string(),
        ModOutcome::NotBanned => "not banned here.".to_string(),
        ModOutcome::Unwarned { remaining } => {
            format!("one warning removed ({remaining} left).")
        }
        ModOutcome::Forgiven => "forgiven, record cleared.".to_string(),
        ModOutcome::NothingToUndo => "nothing to undo.".to_string(),
        ModOutcome::Contended => "busy with another action, try again.".to_string(),
    }
}

fn rejection_text(reason: ReportRejection) -> &'static str {
    match reason {
        ReportRejection::ModeDisabled => "Reports are disabled in this group.",
        ReportRejection::SelfReport => "You cannot report yourself.",
        ReportRejection::BotReportee => "That account cannot be reported.",
        ReportRejection::AlreadyFlagged => "That user is already flagged fleet-wide.",
        ReportRejection::ReporterFlagged => "Your reports are not accepted.",
        ReportRejection::AlreadyReported => "A report against that user is already open.",
        ReportRejection::AlreadyBanned => "That user is already banned here.",
        ReportRejection::PartyBusy => "That user is being handled right now, try again.",
    }
}

fn switch(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
