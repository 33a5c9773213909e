//! Inbound exchange dispatch.
//!
//! One call per broadcast the platform binary observes on either
//! exchange channel. Nothing here returns an error for bad *input*; a
//! malformed or unexpected broadcast is logged and dropped so one rogue
//! fleet member cannot wedge the consumer loop. Errors are reserved for
//! local failures (persistence, platform calls on our own behalf).

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use warden_core::time::unix_now;
use warden_core::types::{GroupId, MessageRef, UserId};
use warden_exchange::{Envelope, ExchangeAction};
use warden_ledger::{GroupConfig, ModerationRecord, ReportSession};
use warden_state::{decode_snapshot, TableKind};

use crate::error::Result;
use crate::service::WardenService;

impl WardenService {
    /// Processes one inbound exchange broadcast.
    ///
    /// `attachment` carries the sealed document bytes when the broadcast
    /// had one (table backups).
    pub async fn handle_exchange(&self, raw: &str, attachment: Option<&[u8]>) -> Result<()> {
        let Some(envelope) = Envelope::decode(raw) else {
            return Ok(());
        };
        if !envelope.is_for(&self.config.process_id) {
            debug!(from = %envelope.from, "broadcast not addressed to this process");
            return Ok(());
        }

        match &envelope.action {
            ExchangeAction::UpdateScore => self.on_update_score(&envelope).await?,
            ExchangeAction::AddBad => self.on_add_bad(&envelope)?,
            ExchangeAction::RemoveBad => self.on_remove_bad(&envelope)?,
            ExchangeAction::BackupHide => self.on_backup_hide(&envelope),
            ExchangeAction::BackupFile => self.on_backup_file(&envelope, attachment)?,
            ExchangeAction::ConfigCommit => self.on_config_commit(&envelope)?,
            ExchangeAction::ConfigReply => self.on_config_reply(&envelope).await,
            ExchangeAction::LeaveApprove => self.on_leave_approve(&envelope).await?,
            ExchangeAction::HelpReport => self.on_help_report(&envelope).await?,
            ExchangeAction::Unknown { action, kind } => {
                debug!(from = %envelope.from, action, kind, "unrecognized action pair ignored");
            }
            other => {
                // Pairs this process only ever sends.
                debug!(from = %envelope.from, action = ?other, "outbound-only action received, ignored");
            }
        }
        Ok(())
    }

    async fn on_update_score(&self, envelope: &Envelope) -> Result<()> {
        let (Some(user), Some(score)) = (
            field_u64(&envelope.data, "id").map(UserId::new),
            envelope.data.get("score").and_then(Value::as_f64),
        ) else {
            warn!(from = %envelope.from, "score update missing id or score");
            return Ok(());
        };

        let source = envelope.from.source_key();
        self.ledger.modify(user, |r| {
            if score == 0.0 {
                r.scores.clear(&source);
            } else {
                r.scores.set(source.clone(), score);
            }
        })?;
        self.persist_ledger()?;
        debug!(%user, source = %envelope.from, score, "score contribution recorded");
        Ok(())
    }

    fn on_add_bad(&self, envelope: &Envelope) -> Result<()> {
        let Some(user) = field_u64(&envelope.data, "id").map(UserId::new) else {
            warn!(from = %envelope.from, "bad-user add missing id");
            return Ok(());
        };
        if self.bad.insert(user)? {
            info!(%user, from = %envelope.from, "user added to bad set");
            self.persist_bad()?;
        }
        Ok(())
    }

    fn on_remove_bad(&self, envelope: &Envelope) -> Result<()> {
        let Some(user) = field_u64(&envelope.data, "id").map(UserId::new) else {
            warn!(from = %envelope.from, "bad-user removal missing id");
            return Ok(());
        };
        if self.bad.remove(user)? {
            // Fleet-level pardon: the local record goes with the flag.
            self.ledger.reset(user)?;
            info!(%user, from = %envelope.from, "user removed from bad set, record reset");
            self.persist_bad()?;
            self.persist_ledger()?;
        }
        Ok(())
    }

    fn on_backup_hide(&self, envelope: &Envelope) {
        let hide = envelope.data.as_bool().unwrap_or(true);
        info!(from = %envelope.from, hide, "channel failover control received");
        self.publisher.selector().apply_hide(hide);
    }

    fn on_backup_file(&self, envelope: &Envelope, attachment: Option<&[u8]>) -> Result<()> {
        let Some(sealed) = attachment else {
            warn!(from = %envelope.from, "table backup without attachment");
            return Ok(());
        };
        let Some(table) = envelope.data.get("table").and_then(Value::as_str) else {
            warn!(from = %envelope.from, "table backup without table name");
            return Ok(());
        };
        let bytes = match self.sealer.open(sealed) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(from = %envelope.from, table, error = %e, "could not open sealed table");
                return Ok(());
            }
        };

        let restored = match table {
            t if t == TableKind::Ledger.as_str() => {
                decode_snapshot::<HashMap<UserId, ModerationRecord>>(&bytes)
                    .map(|t| self.ledger.replace(t))
            }
            t if t == TableKind::Configs.as_str() => {
                decode_snapshot::<HashMap<GroupId, GroupConfig>>(&bytes)
                    .map(|t| self.groups.replace_configs(t))
            }
            t if t == TableKind::Admins.as_str() => {
                decode_snapshot::<HashMap<GroupId, HashSet<UserId>>>(&bytes)
                    .map(|t| self.groups.replace_admins(t))
            }
            t if t == TableKind::Reports.as_str() => {
                decode_snapshot::<HashMap<String, ReportSession>>(&bytes)
                    .map(|t| self.reports.replace(t))
            }
            t if t == TableKind::BadIds.as_str() => {
                decode_snapshot::<HashSet<UserId>>(&bytes).map(|t| self.bad.replace(t))
            }
            other => {
                debug!(from = %envelope.from, table = other, "unknown table name ignored");
                return Ok(());
            }
        };
        match restored {
            Ok(inner) => inner?,
            Err(e) => {
                warn!(from = %envelope.from, table, error = %e, "received table does not parse");
                return Ok(());
            }
        }

        info!(from = %envelope.from, table, "table restored from fleet backup");
        // A replaced table can orphan waiting markers; reconcile now
        // rather than waiting for the next sweep.
        self.prune_stale_waiting()?;
        self.persist_ledger()?;
        self.persist_configs()?;
        self.persist_admins()?;
        self.persist_reports()?;
        self.persist_bad()?;
        Ok(())
    }

    fn on_config_commit(&self, envelope: &Envelope) -> Result<()> {
        let (Some(group), Some(config)) = (
            field_i64(&envelope.data, "group_id").map(GroupId::new),
            envelope.data.get("config"),
        ) else {
            warn!(from = %envelope.from, "config commit missing group or config");
            return Ok(());
        };
        let config: GroupConfig = match serde_json::from_value(config.clone()) {
            Ok(config) => config,
            Err(e) => {
                warn!(from = %envelope.from, %group, error = %e, "config commit does not parse");
                return Ok(());
            }
        };
        if let Err(e) = self.groups.commit(group, config, unix_now()) {
            warn!(from = %envelope.from, %group, error = %e, "config commit rejected");
            return Ok(());
        }
        self.persist_configs()?;
        info!(%group, from = %envelope.from, "group config committed");
        Ok(())
    }

    async fn on_config_reply(&self, envelope: &Envelope) {
        let (Some(group), Some(link)) = (
            field_i64(&envelope.data, "group_id").map(GroupId::new),
            envelope.data.get("link").and_then(Value::as_str),
        ) else {
            warn!(from = %envelope.from, "config reply missing group or link");
            return;
        };
        let text = format!("Group settings: {link}");
        if let Err(e) = self.platform.send_message(group, &text).await {
            warn!(%group, error = %e, "could not deliver config link");
        }
    }

    async fn on_leave_approve(&self, envelope: &Envelope) -> Result<()> {
        let Some(group) = field_i64(&envelope.data, "group_id").map(GroupId::new) else {
            warn!(from = %envelope.from, "leave approval missing group");
            return Ok(());
        };
        info!(%group, from = %envelope.from, "leave approved, departing group");
        self.platform.leave_group(group).await?;
        self.groups.remove_group(group)?;
        self.persist_configs()?;
        self.persist_admins()?;
        Ok(())
    }

    async fn on_help_report(&self, envelope: &Envelope) -> Result<()> {
        let (Some(group), Some(user)) = (
            field_i64(&envelope.data, "group_id").map(GroupId::new),
            field_u64(&envelope.data, "user_id").map(UserId::new),
        ) else {
            warn!(from = %envelope.from, "report request missing group or user");
            return Ok(());
        };
        let evidence = field_u64(&envelope.data, "message_id").map(MessageRef::new);
        let reason = envelope
            .data
            .get("reason")
            .and_then(Value::as_str)
            .map(String::from);

        let outcome = self
            .open_report(group, UserId::SYSTEM, user, evidence, reason)
            .await?;
        debug!(%group, %user, from = %envelope.from, ?outcome, "automatic report handled");
        Ok(())
    }
}

fn field_u64(data: &Value, key: &str) -> Option<u64> {
    data.get(key).and_then(Value::as_u64)
}

fn field_i64(data: &Value, key: &str) -> Option<i64> {
    data.get(key).and_then(Value::as_i64)
}
