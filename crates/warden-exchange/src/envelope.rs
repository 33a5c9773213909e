//! Exchange wire codec.
//!
//! Every inter-process message is a JSON object
//! `{"from", "to", "action", "type", "data"}` posted to a broadcast
//! channel the whole fleet reads. The `action`/`type` string pair is a
//! closed vocabulary agreed across the fleet; pairs this process does not
//! recognize decode to [`ExchangeAction::Unknown`] so newer fleet members
//! can ship new types without breaking older ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use warden_core::types::ProcessId;

/// The closed vocabulary of fleet actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeAction {
    /// Ask the user-manager process to ban a user everywhere.
    HelpBan,
    /// Ask the user-manager process to purge a user's messages in a group.
    HelpDelete,
    /// A watcher process asks this process to open a report.
    HelpReport,
    /// A process republished its score contribution for a user.
    UpdateScore,
    /// Add a user to the fleet-wide bad set.
    AddBad,
    /// Remove a user from the bad set and reset their record.
    RemoveBad,
    /// Control message: flip (or revert) the hidden-channel failover.
    BackupHide,
    /// A persisted table travels as an encrypted attachment.
    BackupFile,
    /// Ask the config process to open a settings session for a group.
    ConfigAsk,
    /// The config process commits a new group configuration.
    ConfigCommit,
    /// The config process replies with a settings link to show the group.
    ConfigReply,
    /// This process asks the manager for permission to leave a group.
    LeaveRequest,
    /// The manager approved leaving a group.
    LeaveApprove,
    /// A pair this process does not recognize; logged and ignored.
    Unknown {
        /// Raw `action` field.
        action: String,
        /// Raw `type` field.
        kind: String,
    },
}

impl ExchangeAction {
    /// Returns the wire `action`/`type` pair for this action.
    pub fn wire(&self) -> (&str, &str) {
        match self {
            ExchangeAction::HelpBan => ("help", "ban"),
            ExchangeAction::HelpDelete => ("help", "delete"),
            ExchangeAction::HelpReport => ("help", "report"),
            ExchangeAction::UpdateScore => ("update", "score"),
            ExchangeAction::AddBad => ("add", "bad"),
            ExchangeAction::RemoveBad => ("remove", "bad"),
            ExchangeAction::BackupHide => ("backup", "hide"),
            ExchangeAction::BackupFile => ("backup", "file"),
            ExchangeAction::ConfigAsk => ("config", "ask"),
            ExchangeAction::ConfigCommit => ("config", "commit"),
            ExchangeAction::ConfigReply => ("config", "reply"),
            ExchangeAction::LeaveRequest => ("leave", "request"),
            ExchangeAction::LeaveApprove => ("leave", "approve"),
            ExchangeAction::Unknown { action, kind } => (action, kind),
        }
    }

    /// Maps a wire `action`/`type` pair back into the vocabulary.
    pub fn from_wire(action: &str, kind: &str) -> Self {
        match (action, kind) {
            ("help", "ban") => ExchangeAction::HelpBan,
            ("help", "delete") => ExchangeAction::HelpDelete,
            ("help", "report") => ExchangeAction::HelpReport,
            ("update", "score") => ExchangeAction::UpdateScore,
            ("add", "bad") => ExchangeAction::AddBad,
            ("remove", "bad") => ExchangeAction::RemoveBad,
            ("backup", "hide") => ExchangeAction::BackupHide,
            ("backup", "file") => ExchangeAction::BackupFile,
            ("config", "ask") => ExchangeAction::ConfigAsk,
            ("config", "commit") => ExchangeAction::ConfigCommit,
            ("config", "reply") => ExchangeAction::ConfigReply,
            ("leave", "request") => ExchangeAction::LeaveRequest,
            ("leave", "approve") => ExchangeAction::LeaveApprove,
            _ => ExchangeAction::Unknown {
                action: action.to_string(),
                kind: kind.to_string(),
            },
        }
    }
}

/// Exact JSON shape on the wire.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    from: String,
    to: Vec<String>,
    action: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// A decoded inter-process message.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Sending process.
    pub from: ProcessId,
    /// Intended receivers; everyone else ignores the message.
    pub to: Vec<ProcessId>,
    /// Decoded action.
    pub action: ExchangeAction,
    /// Inline payload. When the real payload travels as an attachment,
    /// this holds a descriptor (e.g. the table name) instead.
    pub data: Value,
}

impl Envelope {
    /// Builds an envelope, removing the sender from its own receiver list.
    ///
    /// A process must never treat its own broadcast as inbound, so the
    /// sender is stripped here rather than trusted to every call site.
    /// An empty receiver list is legal and simply means no cooperating
    /// process will act on the message.
    pub fn new(
        sender: ProcessId,
        receivers: Vec<ProcessId>,
        action: ExchangeAction,
        data: Value,
    ) -> Self {
        let to = receivers.into_iter().filter(|r| *r != sender).collect();
        Envelope {
            from: sender,
            to,
            action,
            data,
        }
    }

    /// Returns true if the given process should act on this envelope.
    pub fn is_for(&self, id: &ProcessId) -> bool {
        self.to.contains(id)
    }

    /// Serializes to the canonical wire form.
    pub fn encode(&self) -> crate::error::Result<String> {
        let (action, kind) = self.action.wire();
        let wire = WireEnvelope {
            from: self.from.as_str().to_string(),
            to: self.to.iter().map(|p| p.as_str().to_string()).collect(),
            action: action.to_string(),
            kind: kind.to_string(),
            data: self.data.clone(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parses an inbound broadcast.
    ///
    /// Malformed input is logged and yields `None`; a single bad broadcast
    /// must never take down the consumer loop.
    pub fn decode(raw: &str) -> Option<Envelope> {
        let wire: WireEnvelope = match serde_json::from_str(raw) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "dropping malformed exchange message");
                return None;
            }
        };
        Some(Envelope {
            from: ProcessId::new(wire.from),
            to: wire.to.into_iter().map(ProcessId::new).collect(),
            action: ExchangeAction::from_wire(&wire.action, &wire.kind),
            data: wire.data,
        })
    }
}
