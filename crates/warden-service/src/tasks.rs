//! Periodic maintenance tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use warden_core::time::unix_now;
use warden_core::types::GroupId;
use warden_exchange::{Envelope, ExchangeAction};
use warden_state::TableKind;

use crate::error::Result;
use crate::platform::PlatformError;
use crate::service::WardenService;

const REPORT_SWEEP_PERIOD: Duration = Duration::from_secs(60);
const ADMIN_REFRESH_PERIOD: Duration = Duration::from_secs(600);
const BACKUP_PERIOD: Duration = Duration::from_secs(3600);

impl WardenService {
    /// Re-reads every group's admin roster from the platform.
    ///
    /// A group where the bot itself is missing or stripped of its
    /// moderation permissions is useless to moderate; for those this
    /// asks the fleet manager for permission to leave.
    pub async fn refresh_admins(&self) -> Result<()> {
        for group in self.groups.groups()? {
            let roster = match self.platform.get_admins(group).await {
                Ok(roster) => roster,
                Err(PlatformError::Denied) => {
                    warn!(%group, "cannot read admin roster, requesting leave");
                    self.request_leave(group, "admin roster unreadable").await?;
                    continue;
                }
                Err(e) => {
                    warn!(%group, error = %e, "admin refresh failed, keeping cached roster");
                    continue;
                }
            };

            let me = roster.iter().find(|a| a.user == self.config.bot_user_id);
            let usable = me.is_some_and(|a| a.can_delete_messages && a.can_restrict_members);
            if !usable {
                warn!(%group, "bot lacks moderation permissions, requesting leave");
                self.request_leave(group, "missing moderation permissions")
                    .await?;
            }

            let humans: HashSet<_> = roster
                .iter()
                .filter(|a| !a.is_bot)
                .map(|a| a.user)
                .collect();
            self.groups.set_admins(group, humans)?;
        }
        self.persist_admins()?;
        Ok(())
    }

    /// Ships every persisted table to the backup receivers as a sealed
    /// attachment.
    pub async fn broadcast_backups(&self) -> Result<()> {
        for kind in TableKind::ALL {
            let Some(bytes) = self.store.raw(kind)? else {
                continue;
            };
            let sealed = self.sealer.seal(&bytes)?;
            let envelope = Envelope::new(
                self.config.process_id.clone(),
                self.config.backup_receivers.clone(),
                ExchangeAction::BackupFile,
                json!({"table": kind.as_str()}),
            );
            let filename = format!("{}.json.enc", kind.as_str());
            if !self
                .publisher
                .publish_with_attachment(&envelope, &filename, &sealed)
                .await?
            {
                warn!(table = kind.as_str(), "table backup broadcast failed");
            } else {
                debug!(table = kind.as_str(), bytes = sealed.len(), "table backup shipped");
            }
        }
        Ok(())
    }

    async fn request_leave(&self, group: GroupId, reason: &str) -> Result<()> {
        let envelope = Envelope::new(
            self.config.process_id.clone(),
            self.config.help_receivers.clone(),
            ExchangeAction::LeaveRequest,
            json!({"group_id": group.as_i64(), "reason": reason}),
        );
        self.publisher.publish(&envelope).await?;
        Ok(())
    }

    /// Spawns the periodic loops: report expiry, admin refresh, and
    /// table backups. The handles run until aborted.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("starting periodic maintenance tasks");
        vec![
            spawn_loop(Arc::clone(self), REPORT_SWEEP_PERIOD, |service| async move {
                service.sweep_expired_reports(unix_now()).await.map(|reaped| {
                    if reaped > 0 {
                        info!(reaped, "expired reports reaped");
                    }
                })
            }),
            spawn_loop(Arc::clone(self), ADMIN_REFRESH_PERIOD, |service| async move {
                service.refresh_admins().await
            }),
            spawn_loop(Arc::clone(self), BACKUP_PERIOD, |service| async move {
                service.broadcast_backups().await
            }),
        ]
    }
}

fn spawn_loop<F, Fut>(
    service: Arc<WardenService>,
    period: Duration,
    body: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<WardenService>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = body(Arc::clone(&service)).await {
                warn!(error = %e, "periodic task failed");
            }
        }
    })
}
