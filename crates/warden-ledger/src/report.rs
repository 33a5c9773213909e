//! Open report sessions, keyed by short admin-facing tokens.

use std::collections::HashMap;
use std::sync::RwLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_core::types::{GroupId, MessageRef, UserId};

use crate::error::{LedgerError, Result};

/// Length of the random token admins quote to resolve a report.
const TOKEN_LEN: usize = 8;

/// Lifecycle of a report session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for an admin verdict.
    Open,
    /// An admin is resolving it right now; no second verdict may attach.
    Claimed,
}

/// One pending report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSession {
    /// Group the report was filed in.
    pub group: GroupId,
    /// Who filed it; [`UserId::SYSTEM`] for automatic reports.
    pub reporter: UserId,
    /// Who it is about.
    pub reportee: UserId,
    /// The offending message, if one was attached.
    pub evidence: Option<MessageRef>,
    /// Free-text reason supplied by the reporter, if any.
    #[serde(default)]
    pub reason: Option<String>,
    /// The notice shown in the group, edited when the report resolves.
    pub prompt: Option<MessageRef>,
    /// Unix time the report was opened, drives expiry.
    pub opened_at: u64,
    /// Current lifecycle state.
    pub state: SessionState,
}

/// Shared table of open report sessions.
#[derive(Default)]
pub struct ReportBoard {
    sessions: RwLock<HashMap<String, ReportSession>>,
}

impl ReportBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under a fresh random token.
    pub fn open(&self, session: ReportSession) -> Result<String> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        let token = loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(TOKEN_LEN)
                .map(char::from)
                .collect();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        debug!(token = %token, group = %session.group, reportee = %session.reportee, "report opened");
        sessions.insert(token.clone(), session);
        Ok(token)
    }

    /// A copy of the session behind a token.
    pub fn get(&self, token: &str) -> Result<Option<ReportSession>> {
        let sessions = self.sessions.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(sessions.get(token).cloned())
    }

    /// Marks a session as being resolved and returns a copy of it.
    ///
    /// A second claim on the same token fails until the first resolver
    /// either removes the session or releases its claim.
    pub fn claim(&self, token: &str) -> Result<ReportSession> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        let session = sessions.get_mut(token).ok_or(LedgerError::ReportNotFound)?;
        if session.state == SessionState::Claimed {
            return Err(LedgerError::ReportClaimed);
        }
        session.state = SessionState::Claimed;
        Ok(session.clone())
    }

    /// Reopens a claimed session after a failed resolution attempt.
    pub fn release(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        if let Some(session) = sessions.get_mut(token) {
            session.state = SessionState::Open;
        }
        Ok(())
    }

    /// Removes a resolved or dismissed session.
    pub fn remove(&self, token: &str) -> Result<Option<ReportSession>> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        Ok(sessions.remove(token))
    }

    /// Records the group notice message for later editing.
    pub fn set_prompt(&self, token: &str, prompt: MessageRef) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        if let Some(session) = sessions.get_mut(token) {
            session.prompt = Some(prompt);
        }
        Ok(())
    }

    /// Removes and returns every session older than `ttl`.
    ///
    /// Claimed sessions expire too; a claim that outlives the ttl means
    /// its resolver died without releasing.
    pub fn sweep(&self, now: u64, ttl: u64) -> Result<Vec<(String, ReportSession)>> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| now.saturating_sub(s.opened_at) >= ttl)
            .map(|(t, _)| t.clone())
            .collect();
        let mut out = Vec::with_capacity(expired.len());
        for token in expired {
            if let Some(session) = sessions.remove(&token) {
                out.push((token, session));
            }
        }
        Ok(out)
    }

    /// A copy of the full table, for persistence.
    pub fn snapshot(&self) -> Result<HashMap<String, ReportSession>> {
        let sessions = self.sessions.read().map_err(|_| LedgerError::Poisoned)?;
        Ok(sessions.clone())
    }

    /// Replaces the full table, used when loading at startup.
    pub fn replace(&self, table: HashMap<String, ReportSession>) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| LedgerError::Poisoned)?;
        *sessions = table;
        Ok(())
    }
}
