//! Report workflow: opening tokenized reports and resolving them.
//!
//! A report parks both parties in a `waiting` state until an admin quotes
//! the token with a verdict. Resolution locks both parties (both or
//! neither) and claims the session so two admins cannot resolve the same
//! report; a failed resolution releases the claim and leaves the session
//! open for a retry.

use std::collections::HashSet;

use tracing::{debug, warn};

use warden_core::time::unix_now;
use warden_core::types::{GroupId, MessageRef, UserId};
use warden_ledger::{LedgerError, ReportSession, SessionState};

use crate::error::Result;
use crate::moderator::ModOutcome;
use crate::service::WardenService;

/// The verdict an admin attaches to a report token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Ban the reported user.
    Ban,
    /// Warn the reported user.
    Warn,
    /// The report was unfounded; release both parties.
    Innocent,
    /// The report itself was an abuse: warn the reporter instead.
    /// A no-op for automatic reports, which have no reporter to warn.
    Abuse,
}

/// Why a report was not opened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReportRejection {
    /// The group disabled this report path.
    ModeDisabled,
    /// Users cannot report themselves.
    SelfReport,
    /// Reports against the bot itself are refused.
    BotReportee,
    /// The user is already on the fleet-wide bad list.
    AlreadyFlagged,
    /// The reporter is on the fleet-wide bad list; their reports are
    /// ignored.
    ReporterFlagged,
    /// A report against this user is already pending in this group.
    AlreadyReported,
    /// The user is already banned in this group.
    AlreadyBanned,
    /// One of the parties is mid-action; try again shortly.
    PartyBusy,
}

/// Result of trying to open a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Report opened under this token.
    Opened {
        /// Token admins quote to resolve the report.
        token: String,
    },
    /// Report refused.
    Rejected(ReportRejection),
}

/// Result of trying to resolve a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The verdict was applied.
    Applied(ModOutcome),
    /// The report was dismissed as unfounded.
    Dismissed,
    /// Another resolver holds the session or a party lock; retry later.
    Busy,
}

impl WardenService {
    /// Opens a report against a user.
    ///
    /// Pass [`UserId::SYSTEM`] as the reporter for automatic reports from
    /// watcher processes; those require the group's auto-report mode.
    pub async fn open_report(
        &self,
        group: GroupId,
        reporter: UserId,
        reportee: UserId,
        evidence: Option<MessageRef>,
        reason: Option<String>,
    ) -> Result<ReportOutcome> {
        use ReportRejection::*;

        let config = self.groups.config(group)?;
        let mode_ok = if reporter.is_system() {
            config.report.auto
        } else {
            config.report.manual
        };
        if !mode_ok {
            return Ok(ReportOutcome::Rejected(ModeDisabled));
        }
        if reporter == reportee {
            return Ok(ReportOutcome::Rejected(SelfReport));
        }
        if reportee == self.config.bot_user_id {
            return Ok(ReportOutcome::Rejected(BotReportee));
        }
        if self.bad.contains(reportee)? {
            return Ok(ReportOutcome::Rejected(AlreadyFlagged));
        }
        if !reporter.is_system() && self.bad.contains(reporter)? {
            return Ok(ReportOutcome::Rejected(ReporterFlagged));
        }

        let record = self.ledger.get(reportee)?;
        if record.waiting.contains(&group) {
            return Ok(ReportOutcome::Rejected(AlreadyReported));
        }
        if record.banned.contains(&group) {
            return Ok(ReportOutcome::Rejected(AlreadyBanned));
        }
        // A reporter still party to an open report in this group cannot
        // file a second one.
        if !reporter.is_system() && self.ledger.get(reporter)?.waiting.contains(&group) {
            return Ok(ReportOutcome::Rejected(PartyBusy));
        }
        if self.locks.is_held(reportee, group)
            || (!reporter.is_system() && self.locks.is_held(reporter, group))
        {
            return Ok(ReportOutcome::Rejected(PartyBusy));
        }

        let token = self.reports.open(ReportSession {
            group,
            reporter,
            reportee,
            evidence,
            reason: reason.clone(),
            prompt: None,
            opened_at: unix_now(),
            state: SessionState::Open,
        })?;

        self.ledger.modify(reportee, |r| {
            r.waiting.insert(group);
        })?;
        if !reporter.is_system() {
            self.ledger.modify(reporter, |r| {
                r.waiting.insert(group);
            })?;
        }

        let detail = reason
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        let notice = if config.mention {
            format!("User {reportee} reported{detail}. Admins: reply with a verdict for {token}.")
        } else {
            format!("A member was reported{detail}. Admins: reply with a verdict for {token}.")
        };
        match self.platform.send_message(group, &notice).await {
            Ok(prompt) => self.reports.set_prompt(&token, prompt)?,
            Err(e) => {
                // Could not announce the report; unwind so the parties
                // are not parked waiting on a token nobody can see.
                self.reports.remove(&token)?;
                self.clear_waiting(group, reportee, reporter)?;
                return Err(e.into());
            }
        }

        self.persist_reports()?;
        self.persist_ledger()?;
        Ok(ReportOutcome::Opened { token })
    }

    /// Resolves a report by token.
    pub async fn resolve_report(&self, token: &str, verdict: Verdict) -> Result<ResolveOutcome> {
        let session = self
            .reports
            .get(token)?
            .ok_or(LedgerError::ReportNotFound)?;

        // Lock both parties before claiming so a concurrent moderation
        // action cannot interleave with the verdict.
        let both_parties = !session.reporter.is_system() && session.reporter != session.reportee;
        let _guards = if both_parties {
            match self
                .locks
                .try_acquire_pair(session.reportee, session.reporter, session.group)
            {
                Some((a, b)) => (Some(a), Some(b)),
                None => return Ok(ResolveOutcome::Busy),
            }
        } else {
            match self.locks.try_acquire(session.reportee, session.group) {
                Some(a) => (Some(a), None),
                None => return Ok(ResolveOutcome::Busy),
            }
        };

        match self.reports.claim(token) {
            Ok(_) => {}
            Err(LedgerError::ReportClaimed) => return Ok(ResolveOutcome::Busy),
            Err(e) => return Err(e.into()),
        }

        let applied = match verdict {
            Verdict::Ban => {
                self.apply_ban(
                    session.group,
                    session.reportee,
                    session.evidence,
                    session.reason.as_deref(),
                )
                .await
            }
            Verdict::Warn => {
                self.apply_warn(
                    session.group,
                    session.reportee,
                    session.evidence,
                    session.reason.as_deref(),
                )
                .await
            }
            Verdict::Abuse if !session.reporter.is_system() => {
                self.apply_warn(session.group, session.reporter, None, Some("report abuse"))
                    .await
            }
            Verdict::Innocent | Verdict::Abuse => Ok(ModOutcome::NothingToUndo),
        };
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                // Leave the session open for a retry instead of losing it.
                self.reports.release(token)?;
                return Err(e);
            }
        };

        self.clear_waiting(session.group, session.reportee, session.reporter)?;
        if let Some(prompt) = session.prompt {
            let text = match verdict {
                Verdict::Ban => "Report resolved: banned.",
                Verdict::Warn => "Report resolved: warned.",
                Verdict::Abuse if !session.reporter.is_system() => {
                    "Report resolved: reporter warned."
                }
                Verdict::Innocent | Verdict::Abuse => "Report resolved: no action.",
            };
            if let Err(e) = self
                .platform
                .edit_message(session.group, prompt, text)
                .await
            {
                warn!(token, error = %e, "could not update report notice");
            }
        }

        self.reports.remove(token)?;
        self.persist_reports()?;
        self.persist_ledger()?;

        let dismissed = matches!(verdict, Verdict::Innocent)
            || (matches!(verdict, Verdict::Abuse) && session.reporter.is_system());
        Ok(if dismissed {
            ResolveOutcome::Dismissed
        } else {
            ResolveOutcome::Applied(outcome)
        })
    }

    /// Reaps reports older than the configured ttl, releasing their
    /// parties, and reconciles waiting markers against the open table.
    /// Returns how many reports were reaped.
    pub async fn sweep_expired_reports(&self, now: u64) -> Result<usize> {
        let expired = self.reports.sweep(now, self.config.report_ttl_secs)?;
        for (token, session) in &expired {
            debug!(token = %token, group = %session.group, "report expired unresolved");
            self.clear_waiting(session.group, session.reportee, session.reporter)?;
            if let Some(prompt) = session.prompt {
                if let Err(e) = self
                    .platform
                    .edit_message(session.group, prompt, "Report expired unresolved.")
                    .await
                {
                    warn!(token = %token, error = %e, "could not update expired report notice");
                }
            }
        }

        let pruned = self.prune_stale_waiting()?;
        if expired.is_empty() && !pruned {
            return Ok(0);
        }

        self.persist_reports()?;
        self.persist_ledger()?;
        Ok(expired.len())
    }

    /// Drops waiting markers no open session accounts for, as happens
    /// when a fleet restore replaces the reports table underneath them.
    /// Returns whether anything changed.
    pub(crate) fn prune_stale_waiting(&self) -> Result<bool> {
        let mut active: HashSet<(UserId, GroupId)> = HashSet::new();
        for session in self.reports.snapshot()?.values() {
            active.insert((session.reportee, session.group));
            if !session.reporter.is_system() {
                active.insert((session.reporter, session.group));
            }
        }

        let mut pruned = false;
        for (user, record) in self.ledger.snapshot()? {
            let stale: Vec<GroupId> = record
                .waiting
                .iter()
                .copied()
                .filter(|group| !active.contains(&(user, *group)))
                .collect();
            if stale.is_empty() {
                continue;
            }
            warn!(%user, count = stale.len(), "dropping waiting markers with no open report");
            self.ledger.modify(user, |r| {
                for group in &stale {
                    r.waiting.remove(group);
                }
            })?;
            pruned = true;
        }
        Ok(pruned)
    }

    fn clear_waiting(&self, group: GroupId, reportee: UserId, reporter: UserId) -> Result<()> {
        self.ledger.modify(reportee, |r| {
            r.waiting.remove(&group);
        })?;
        if !reporter.is_system() {
            self.ledger.modify(reporter, |r| {
                r.waiting.remove(&group);
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, GROUP, REPORTER, USER};
    use crate::ServiceError;
    use warden_ledger::ReportSession;

    async fn open(service: &crate::WardenService) -> String {
        match service
            .open_report(GROUP, REPORTER, USER, None, None)
            .await
            .unwrap()
        {
            ReportOutcome::Opened { token } => token,
            other => panic!("report not opened: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_parks_both_parties() {
        let (service, platform, _dir) = fixture();
        let token = open(&service).await;

        assert!(service.ledger.get(USER).unwrap().waiting.contains(&GROUP));
        assert!(service
            .ledger
            .get(REPORTER)
            .unwrap()
            .waiting
            .contains(&GROUP));
        // The group saw a notice quoting the token.
        let notices = platform.sent_texts(GROUP);
        assert!(notices.iter().any(|t| t.contains(&token)));
    }

    #[tokio::test]
    async fn test_self_report_rejected() {
        let (service, _platform, _dir) = fixture();
        let outcome = service
            .open_report(GROUP, USER, USER, None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Rejected(ReportRejection::SelfReport)
        );
    }

    #[tokio::test]
    async fn test_report_against_bot_rejected() {
        let (service, _platform, _dir) = fixture();
        let bot = service.config().bot_user_id;
        let outcome = service
            .open_report(GROUP, REPORTER, bot, None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Rejected(ReportRejection::BotReportee)
        );
    }

    #[tokio::test]
    async fn test_flagged_reporter_rejected() {
        let (service, _platform, _dir) = fixture();
        service.bad.insert(REPORTER).unwrap();
        let outcome = service
            .open_report(GROUP, REPORTER, USER, None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Rejected(ReportRejection::ReporterFlagged)
        );
    }

    #[tokio::test]
    async fn test_duplicate_report_rejected() {
        let (service, _platform, _dir) = fixture();
        open(&service).await;
        let outcome = service
            .open_report(GROUP, REPORTER, USER, None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Rejected(ReportRejection::AlreadyReported)
        );
    }

    #[tokio::test]
    async fn test_auto_report_requires_mode() {
        let (service, _platform, _dir) = fixture();
        let outcome = service
            .open_report(GROUP, UserId::SYSTEM, USER, None, None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReportOutcome::Rejected(ReportRejection::ModeDisabled)
        );

        service
            .groups
            .apply_edit(GROUP, 1000, 0, |c| c.report.auto = true)
            .unwrap();
        let outcome = service
            .open_report(GROUP, UserId::SYSTEM, USER, None, None)
            .await
            .unwrap();
        assert!(matches!(outcome, ReportOutcome::Opened { .. }));
    }

    #[tokio::test]
    async fn test_resolve_ban_clears_waiting() {
        let (service, platform, _dir) = fixture();
        let token = open(&service).await;

        let outcome = service.resolve_report(&token, Verdict::Ban).await.unwrap();
        assert_eq!(outcome, ResolveOutcome::Applied(ModOutcome::Banned));
        assert!(platform.banned(GROUP, USER).is_some());

        let record = service.ledger.get(USER).unwrap();
        assert!(!record.waiting.contains(&GROUP));
        assert!(record.banned.contains(&GROUP));
        assert!(!service
            .ledger
            .get(REPORTER)
            .unwrap()
            .waiting
            .contains(&GROUP));

        // Locks released once the verdict is applied.
        assert!(!service.locks.is_held(USER, GROUP));
        assert!(!service.locks.is_held(REPORTER, GROUP));
    }

    #[tokio::test]
    async fn test_abuse_verdict_warns_reporter() {
        let (service, platform, _dir) = fixture();
        let token = open(&service).await;

        let outcome = service
            .resolve_report(&token, Verdict::Abuse)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolveOutcome::Applied(ModOutcome::Warned { count: 1, limit: 3 })
        );

        // The reporter carries the warning; the reportee walks free.
        let reporter = service.ledger.get(REPORTER).unwrap();
        assert_eq!(reporter.warnings.get(&GROUP), Some(&1));
        assert!(!reporter.waiting.contains(&GROUP));
        assert!(service.ledger.get(USER).unwrap().is_clean());
        assert!(platform.banned(GROUP, USER).is_none());

        assert!(platform
            .edited()
            .iter()
            .any(|(_, _, text)| text.contains("reporter warned")));
    }

    #[tokio::test]
    async fn test_abuse_on_automatic_report_is_dismissed() {
        let (service, _platform, _dir) = fixture();
        service
            .groups
            .apply_edit(GROUP, 1000, 0, |c| c.report.auto = true)
            .unwrap();
        let token = match service
            .open_report(GROUP, UserId::SYSTEM, USER, None, None)
            .await
            .unwrap()
        {
            ReportOutcome::Opened { token } => token,
            other => panic!("report not opened: {other:?}"),
        };

        // No reporter to warn on an automatic report.
        let outcome = service
            .resolve_report(&token, Verdict::Abuse)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Dismissed);
        assert!(service.ledger.get(USER).unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_reporter_cannot_file_while_party_to_a_report() {
        let (service, _platform, _dir) = fixture();
        open(&service).await;

        let other = UserId::new(44);
        let outcome = service
            .open_report(GROUP, REPORTER, other, None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Rejected(ReportRejection::PartyBusy));
    }

    #[tokio::test]
    async fn test_reason_stored_and_quoted_in_notice() {
        let (service, platform, _dir) = fixture();
        let token = match service
            .open_report(GROUP, REPORTER, USER, None, Some("spam links".into()))
            .await
            .unwrap()
        {
            ReportOutcome::Opened { token } => token,
            other => panic!("report not opened: {other:?}"),
        };

        let session = service.reports.get(&token).unwrap().unwrap();
        assert_eq!(session.reason.as_deref(), Some("spam links"));
        assert!(platform
            .sent_texts(GROUP)
            .iter()
            .any(|t| t.contains("(spam links)")));
    }

    #[tokio::test]
    async fn test_second_resolution_fails() {
        let (service, _platform, _dir) = fixture();
        let token = open(&service).await;
        service
            .resolve_report(&token, Verdict::Innocent)
            .await
            .unwrap();

        let err = service.resolve_report(&token, Verdict::Ban).await;
        assert!(matches!(
            err,
            Err(ServiceError::Ledger(LedgerError::ReportNotFound))
        ));
    }

    #[tokio::test]
    async fn test_resolution_busy_while_party_locked() {
        let (service, _platform, _dir) = fixture();
        let token = open(&service).await;

        let _guard = service.locks.try_acquire(REPORTER, GROUP).unwrap();
        let outcome = service.resolve_report(&token, Verdict::Ban).await.unwrap();
        assert_eq!(outcome, ResolveOutcome::Busy);

        // Both-or-neither: the reportee leg must not remain locked.
        assert!(!service.locks.is_held(USER, GROUP));
        // The session survives for a later attempt.
        assert!(service.reports.get(&token).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_resolution_releases_claim() {
        let (service, platform, _dir) = fixture();
        let token = open(&service).await;

        // Attach evidence after opening so only the verdict forwards it.
        let session = service.reports.get(&token).unwrap().unwrap();
        let mut table = service.reports.snapshot().unwrap();
        table.insert(
            token.clone(),
            ReportSession {
                evidence: Some(MessageRef::new(321)),
                ..session
            },
        );
        service.reports.replace(table).unwrap();

        platform.fail_forwards();
        assert!(service.resolve_report(&token, Verdict::Ban).await.is_err());

        // Claim released: a retry is possible once the platform recovers.
        let session = service.reports.get(&token).unwrap().unwrap();
        assert_eq!(session.state, SessionState::Open);
        assert!(!service.locks.is_held(USER, GROUP));
    }

    #[tokio::test]
    async fn test_sweep_releases_parties() {
        let (service, platform, _dir) = fixture();
        let token = open(&service).await;

        let ttl = service.config().report_ttl_secs;
        let reaped = service
            .sweep_expired_reports(unix_now() + ttl + 1)
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        assert!(service.reports.get(&token).unwrap().is_none());
        assert!(!service.ledger.get(USER).unwrap().waiting.contains(&GROUP));
        // The group notice was updated.
        assert!(platform
            .edited()
            .iter()
            .any(|(_, _, text)| text.contains("expired")));
    }

    #[tokio::test]
    async fn test_sweep_drops_waiting_markers_without_a_session() {
        let (service, _platform, _dir) = fixture();
        open(&service).await;

        // The reports table vanishes underneath the waiting markers, as
        // a fleet restore would make happen.
        service.reports.replace(Default::default()).unwrap();
        assert!(service.ledger.get(USER).unwrap().waiting.contains(&GROUP));

        let reaped = service.sweep_expired_reports(unix_now()).await.unwrap();
        assert_eq!(reaped, 0);
        assert!(!service.ledger.get(USER).unwrap().waiting.contains(&GROUP));
        assert!(!service
            .ledger
            .get(REPORTER)
            .unwrap()
            .waiting
            .contains(&GROUP));
    }
}
