//! Service wiring: construction, table loading, and persistence.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use warden_core::WardenConfig;
use warden_exchange::{AttachmentSealer, BroadcastChannel, ChannelSelector, Publisher};
use warden_ledger::{BadIds, GroupRegistry, Ledger, PairLockManager, ReportBoard};
use warden_state::{StateStore, TableKind};

use crate::error::Result;
use crate::platform::PlatformClient;

/// One running Warden process.
///
/// All fields use interior mutability; the service is constructed once,
/// wrapped in an [`Arc`], and shared by the exchange loop, the command
/// handlers, and the periodic tasks.
pub struct WardenService {
    pub(crate) config: WardenConfig,
    pub(crate) platform: Arc<dyn PlatformClient>,
    pub(crate) publisher: Publisher<dyn BroadcastChannel>,
    pub(crate) sealer: AttachmentSealer,
    pub(crate) store: StateStore,
    pub(crate) ledger: Ledger,
    pub(crate) locks: PairLockManager,
    pub(crate) groups: GroupRegistry,
    pub(crate) bad: BadIds,
    pub(crate) reports: ReportBoard,
}

impl WardenService {
    /// Builds a service from validated config and platform adapters.
    ///
    /// Loads every persisted table before returning; a table whose
    /// primary and backup snapshots are both unreadable aborts startup.
    pub fn new(
        config: WardenConfig,
        platform: Arc<dyn PlatformClient>,
        transport: Arc<dyn BroadcastChannel>,
    ) -> anyhow::Result<Arc<Self>> {
        config.validate()?;

        let sealer = AttachmentSealer::from_hex(&config.attachment_key)
            .context("attachment key rejected")?;
        let selector = Arc::new(ChannelSelector::new(
            config.exchange_channel,
            config.hidden_channel,
        ));
        let publisher = Publisher::new(transport, selector, config.emergency_channel);

        let store = StateStore::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;

        let service = WardenService {
            config,
            platform,
            publisher,
            sealer,
            store,
            ledger: Ledger::new(),
            locks: PairLockManager::new(),
            groups: GroupRegistry::new(),
            bad: BadIds::new(),
            reports: ReportBoard::new(),
        };
        service.load_tables().context("loading persisted state")?;

        info!(
            process = %service.config.process_id,
            data_dir = %service.config.data_dir.display(),
            "warden service initialized"
        );
        Ok(Arc::new(service))
    }

    fn load_tables(&self) -> anyhow::Result<()> {
        self.ledger.replace(self.store.load(TableKind::Ledger)?)?;
        self.groups
            .replace_configs(self.store.load(TableKind::Configs)?)?;
        self.groups
            .replace_admins(self.store.load(TableKind::Admins)?)?;
        self.reports.replace(self.store.load(TableKind::Reports)?)?;
        self.bad.replace(self.store.load(TableKind::BadIds)?)?;
        Ok(())
    }

    /// The loaded configuration.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The channel selector driving exchange failover.
    pub fn selector(&self) -> &ChannelSelector {
        self.publisher.selector()
    }

    /// The per-user moderation records.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Group configs and cached admin rosters.
    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// The fleet-wide bad-user set.
    pub fn bad(&self) -> &BadIds {
        &self.bad
    }

    /// Open report sessions.
    pub fn reports(&self) -> &ReportBoard {
        &self.reports
    }

    /// The advisory pair locks.
    pub fn locks(&self) -> &PairLockManager {
        &self.locks
    }

    /// The attachment sealer configured from the fleet key.
    pub fn sealer(&self) -> &AttachmentSealer {
        &self.sealer
    }

    pub(crate) fn persist_ledger(&self) -> Result<()> {
        self.store
            .save(TableKind::Ledger, &self.ledger.snapshot()?)?;
        Ok(())
    }

    pub(crate) fn persist_configs(&self) -> Result<()> {
        self.store
            .save(TableKind::Configs, &self.groups.config_snapshot()?)?;
        Ok(())
    }

    pub(crate) fn persist_admins(&self) -> Result<()> {
        self.store
            .save(TableKind::Admins, &self.groups.admin_snapshot()?)?;
        Ok(())
    }

    pub(crate) fn persist_reports(&self) -> Result<()> {
        self.store
            .save(TableKind::Reports, &self.reports.snapshot()?)?;
        Ok(())
    }

    pub(crate) fn persist_bad(&self) -> Result<()> {
        self.store.save(TableKind::BadIds, &self.bad.snapshot()?)?;
        Ok(())
    }
}
