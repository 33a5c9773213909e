//! Process configuration.
//!
//! One Warden process is a single fleet member with a fixed process name,
//! a set of broadcast channels, and local policy defaults. Configuration
//! is loaded from TOML or JSON by file extension and validated before the
//! process is allowed to start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{ChannelId, ProcessId, UserId};

/// Relative score contribution of each moderation dimension.
///
/// The exact constants are policy, not protocol: cooperating processes
/// sum whatever each process reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of each group the user is banned in.
    pub ban: f64,
    /// Weight of each group the user was kicked from.
    pub kick: f64,
    /// Weight of each group the user holds live warnings in.
    pub warn: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ban: 1.0,
            kick: 0.6,
            warn: 0.4,
        }
    }
}

/// Full configuration for one Warden process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Fleet name of this process, e.g. "WARN".
    pub process_id: ProcessId,
    /// Platform account id of this bot, used to refuse reports against it.
    pub bot_user_id: UserId,
    /// Directory holding persisted state tables.
    pub data_dir: PathBuf,
    /// Primary broadcast channel shared by the fleet.
    pub exchange_channel: ChannelId,
    /// Secondary channel used after failover.
    pub hidden_channel: ChannelId,
    /// Operator-facing channel for emergency notices.
    pub emergency_channel: ChannelId,
    /// Channel where evidence messages are stored.
    pub log_channel: ChannelId,
    /// Channel for per-operation debug traces.
    pub debug_channel: ChannelId,
    /// Fleet members that consume score updates.
    pub score_receivers: Vec<ProcessId>,
    /// Fleet members that act on help requests (bans, purges, reports).
    #[serde(default)]
    pub help_receivers: Vec<ProcessId>,
    /// Fleet members that archive table backups.
    #[serde(default)]
    pub backup_receivers: Vec<ProcessId>,
    /// Hex-encoded 32-byte key sealing exchange attachments.
    pub attachment_key: String,
    /// Open report sessions older than this are reaped.
    pub report_ttl_secs: u64,
    /// Cooldown between configuration sessions for one group.
    pub config_cooldown_secs: u64,
    /// Score policy for this process's own contribution.
    #[serde(default)]
    pub score_weights: ScoreWeights,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            process_id: ProcessId::new(""),
            bot_user_id: UserId::SYSTEM,
            data_dir: PathBuf::from("data"),
            exchange_channel: ChannelId::new(0),
            hidden_channel: ChannelId::new(0),
            emergency_channel: ChannelId::new(0),
            log_channel: ChannelId::new(0),
            debug_channel: ChannelId::new(0),
            score_receivers: Vec::new(),
            help_receivers: Vec::new(),
            backup_receivers: Vec::new(),
            attachment_key: String::new(),
            report_ttl_secs: 86_400,
            config_cooldown_secs: 310,
            score_weights: ScoreWeights::default(),
        }
    }
}

impl WardenConfig {
    /// Loads configuration from a TOML or JSON file by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: WardenConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would leave the process half-connected.
    ///
    /// A process with a missing channel id would drop whole categories of
    /// traffic silently, so startup refuses instead.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.process_id.as_str().is_empty() {
            anyhow::bail!("process_id must not be empty");
        }
        if self.bot_user_id.is_system() {
            anyhow::bail!("bot_user_id must be set");
        }
        for (name, channel) in [
            ("exchange_channel", self.exchange_channel),
            ("hidden_channel", self.hidden_channel),
            ("emergency_channel", self.emergency_channel),
            ("log_channel", self.log_channel),
            ("debug_channel", self.debug_channel),
        ] {
            if channel.is_unset() {
                anyhow::bail!("{} must be set", name);
            }
        }
        if self.attachment_key.len() != 64
            || !self.attachment_key.bytes().all(|b| b.is_ascii_hexdigit())
        {
            anyhow::bail!("attachment_key must be 64 hex characters (32 bytes)");
        }
        if self.report_ttl_secs == 0 {
            anyhow::bail!("report_ttl_secs must be positive");
        }
        Ok(())
    }
}
