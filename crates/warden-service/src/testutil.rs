//! Shared fixtures for service unit tests: a recording platform mock, an
//! in-memory broadcast channel, and a fully wired service over a temp
//! data directory.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use warden_core::types::{ChannelId, GroupId, MessageRef, ProcessId, UserId};
use warden_core::WardenConfig;
use warden_exchange::BroadcastChannel;

use crate::platform::{ChatAdmin, PlatformClient, PlatformError};
use crate::service::WardenService;

pub(crate) const USER: UserId = UserId::new(42);
pub(crate) const REPORTER: UserId = UserId::new(43);
pub(crate) const GROUP: GroupId = GroupId::new(-100);

pub(crate) const EXCHANGE: ChannelId = ChannelId::new(-1001);
pub(crate) const HIDDEN: ChannelId = ChannelId::new(-1002);
pub(crate) const EMERGENCY: ChannelId = ChannelId::new(-1003);

#[derive(Default)]
struct PlatformState {
    banned: HashSet<(GroupId, UserId)>,
    kicked: Vec<(GroupId, UserId)>,
    sent: Vec<(GroupId, String)>,
    buttons: Vec<(GroupId, String, String)>,
    channel_sent: Vec<(ChannelId, String)>,
    edited: Vec<(GroupId, MessageRef, String)>,
    deleted: Vec<(GroupId, MessageRef)>,
    forwarded: Vec<(GroupId, MessageRef, ChannelId)>,
    left: Vec<GroupId>,
    admins: HashMap<GroupId, Vec<ChatAdmin>>,
}

/// Records every platform call and lets tests inject failures.
#[derive(Default)]
pub(crate) struct MockPlatform {
    state: Mutex<PlatformState>,
    next_message: AtomicUsize,
    ban_calls: AtomicUsize,
    fail_forward: AtomicBool,
    deny_admins: AtomicBool,
}

impl MockPlatform {
    pub(crate) fn banned(&self, group: GroupId, user: UserId) -> Option<()> {
        self.state
            .lock()
            .unwrap()
            .banned
            .contains(&(group, user))
            .then_some(())
    }

    pub(crate) fn ban_calls(&self) -> usize {
        self.ban_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_forwards(&self) {
        self.fail_forward.store(true, Ordering::SeqCst);
    }

    pub(crate) fn deny_admin_lookup(&self) {
        self.deny_admins.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_admins(&self, group: GroupId, roster: Vec<ChatAdmin>) {
        self.state.lock().unwrap().admins.insert(group, roster);
    }

    pub(crate) fn sent_texts(&self, group: GroupId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub(crate) fn buttons(&self) -> Vec<(GroupId, String, String)> {
        self.state.lock().unwrap().buttons.clone()
    }

    pub(crate) fn channel_texts(&self, channel: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .channel_sent
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub(crate) fn edited(&self) -> Vec<(GroupId, MessageRef, String)> {
        self.state.lock().unwrap().edited.clone()
    }

    pub(crate) fn forward_count(&self) -> usize {
        self.state.lock().unwrap().forwarded.len()
    }

    pub(crate) fn left_groups(&self) -> Vec<GroupId> {
        self.state.lock().unwrap().left.clone()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn send_message(
        &self,
        group: GroupId,
        text: &str,
    ) -> Result<MessageRef, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((group, text.to_string()));
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000;
        Ok(MessageRef::new(id))
    }

    async fn send_message_with_button(
        &self,
        group: GroupId,
        text: &str,
        payload: &str,
    ) -> Result<MessageRef, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .buttons
            .push((group, text.to_string(), payload.to_string()));
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000;
        Ok(MessageRef::new(id))
    }

    async fn send_channel_message(
        &self,
        channel: ChannelId,
        text: &str,
    ) -> Result<MessageRef, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .channel_sent
            .push((channel, text.to_string()));
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000;
        Ok(MessageRef::new(id))
    }

    async fn edit_message(
        &self,
        group: GroupId,
        message: MessageRef,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.state
            .lock()
            .unwrap()
            .edited
            .push((group, message, text.to_string()));
        Ok(())
    }

    async fn delete_messages(
        &self,
        group: GroupId,
        messages: &[MessageRef],
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        for m in messages {
            state.deleted.push((group, *m));
        }
        Ok(())
    }

    async fn ban_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError> {
        self.ban_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().banned.insert((group, user));
        Ok(())
    }

    async fn kick_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError> {
        self.state.lock().unwrap().kicked.push((group, user));
        Ok(())
    }

    async fn unban_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError> {
        self.state.lock().unwrap().banned.remove(&(group, user));
        Ok(())
    }

    async fn forward_message(
        &self,
        group: GroupId,
        message: MessageRef,
        to: ChannelId,
    ) -> Result<MessageRef, PlatformError> {
        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("forward refused".into()));
        }
        self.state
            .lock()
            .unwrap()
            .forwarded
            .push((group, message, to));
        Ok(MessageRef::new(message.as_u64() + 500_000))
    }

    async fn get_admins(&self, group: GroupId) -> Result<Vec<ChatAdmin>, PlatformError> {
        if self.deny_admins.load(Ordering::SeqCst) {
            return Err(PlatformError::Denied);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .admins
            .get(&group)
            .cloned()
            .unwrap_or_default())
    }

    async fn leave_group(&self, group: GroupId) -> Result<(), PlatformError> {
        self.state.lock().unwrap().left.push(group);
        Ok(())
    }
}

/// In-memory broadcast transport that records everything it sends.
#[derive(Default)]
pub(crate) struct MemoryChannel {
    pub(crate) sent: Mutex<Vec<(ChannelId, String)>>,
    pub(crate) documents: Mutex<Vec<(ChannelId, String, String, Vec<u8>)>>,
    fail_primary: AtomicBool,
}

impl MemoryChannel {
    pub(crate) fn fail_primary(&self) {
        self.fail_primary.store(true, Ordering::SeqCst);
    }

    pub(crate) fn texts_on(&self, channel: ChannelId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl BroadcastChannel for MemoryChannel {
    async fn send_text(&self, channel: ChannelId, text: &str) -> bool {
        if channel == EXCHANGE && self.fail_primary.load(Ordering::SeqCst) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel, text.to_string()));
        true
    }

    async fn send_document(
        &self,
        channel: ChannelId,
        caption: &str,
        filename: &str,
        bytes: &[u8],
    ) -> bool {
        if channel == EXCHANGE && self.fail_primary.load(Ordering::SeqCst) {
            return false;
        }
        self.documents.lock().unwrap().push((
            channel,
            caption.to_string(),
            filename.to_string(),
            bytes.to_vec(),
        ));
        true
    }
}

pub(crate) fn test_config(data_dir: &std::path::Path) -> WardenConfig {
    WardenConfig {
        process_id: ProcessId::new("WARN"),
        bot_user_id: UserId::new(777),
        data_dir: data_dir.to_path_buf(),
        exchange_channel: EXCHANGE,
        hidden_channel: HIDDEN,
        emergency_channel: EMERGENCY,
        log_channel: ChannelId::new(-1004),
        debug_channel: ChannelId::new(-1005),
        score_receivers: vec![ProcessId::new("USER"), ProcessId::new("NOSPAM")],
        help_receivers: vec![ProcessId::new("USER")],
        backup_receivers: vec![ProcessId::new("BACKUP")],
        attachment_key: "ab".repeat(32),
        ..WardenConfig::default()
    }
}

/// A wired service with recording mocks over a temp data directory.
pub(crate) fn fixture_full() -> (
    Arc<WardenService>,
    Arc<MockPlatform>,
    Arc<MemoryChannel>,
    TempDir,
) {
    let dir = TempDir::new().unwrap();
    let platform = Arc::new(MockPlatform::default());
    let channel = Arc::new(MemoryChannel::default());
    let service = WardenService::new(
        test_config(dir.path()),
        Arc::clone(&platform) as Arc<dyn PlatformClient>,
        Arc::clone(&channel) as Arc<dyn BroadcastChannel>,
    )
    .unwrap();
    (service, platform, channel, dir)
}

pub(crate) fn fixture() -> (Arc<WardenService>, Arc<MockPlatform>, TempDir) {
    let (service, platform, _channel, dir) = fixture_full();
    (service, platform, dir)
}
