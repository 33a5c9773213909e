//! Test environment: a wired service over mock adapters.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use warden_core::types::{ChannelId, GroupId, MessageRef, ProcessId, UserId};
use warden_core::WardenConfig;
use warden_exchange::BroadcastChannel;
use warden_service::{ChatAdmin, PlatformClient, PlatformError, WardenService};

/// Standard actors used across the scenarios.
pub const ADMIN: UserId = UserId::new(9);
/// An ordinary member.
pub const USER: UserId = UserId::new(42);
/// A second ordinary member.
pub const REPORTER: UserId = UserId::new(43);
/// The group under test.
pub const GROUP: GroupId = GroupId::new(-100);

/// Primary exchange channel id used by [`TestEnv`].
pub const EXCHANGE: ChannelId = ChannelId::new(-1001);
/// Hidden backup channel id.
pub const HIDDEN: ChannelId = ChannelId::new(-1002);
/// Emergency channel id.
pub const EMERGENCY: ChannelId = ChannelId::new(-1003);

#[derive(Default)]
struct PlatformState {
    banned: HashSet<(GroupId, UserId)>,
    sent: Vec<(GroupId, String)>,
    buttons: Vec<(GroupId, String, String)>,
    channel_sent: Vec<(ChannelId, String)>,
    edited: Vec<(GroupId, MessageRef, String)>,
    forwarded: Vec<(GroupId, MessageRef, ChannelId)>,
    admins: HashMap<GroupId, Vec<ChatAdmin>>,
    left: Vec<GroupId>,
}

/// Recording platform mock with injectable failures.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<PlatformState>,
    next_message: AtomicUsize,
    fail_forward: AtomicBool,
}

impl MockPlatform {
    /// Whether a user is banned in a group.
    pub fn is_banned(&self, group: GroupId, user: UserId) -> bool {
        self.state.lock().unwrap().banned.contains(&(group, user))
    }

    /// Texts the bot posted in a group.
    pub fn sent_texts(&self, group: GroupId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Button-carrying messages the bot posted: (group, text, payload).
    pub fn buttons(&self) -> Vec<(GroupId, String, String)> {
        self.state.lock().unwrap().buttons.clone()
    }

    /// Texts the bot posted to a service channel.
    pub fn channel_texts(&self, channel: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .channel_sent
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Messages the bot archived to a channel.
    pub fn forwards(&self) -> Vec<(GroupId, MessageRef, ChannelId)> {
        self.state.lock().unwrap().forwarded.clone()
    }

    /// Message edits the bot performed.
    pub fn edits(&self) -> Vec<(GroupId, MessageRef, String)> {
        self.state.lock().unwrap().edited.clone()
    }

    /// Groups the bot left.
    pub fn left_groups(&self) -> Vec<GroupId> {
        self.state.lock().unwrap().left.clone()
    }

    /// Make every forward fail until further notice.
    pub fn fail_forwards(&self) {
        self.fail_forward.store(true, Ordering::SeqCst);
    }

    /// Installs an admin roster for a group.
    pub fn set_admins(&self, group: GroupId, roster: Vec<ChatAdmin>) {
        self.state.lock().unwrap().admins.insert(group, roster);
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
        Ok(MessageRef::new(
            self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000,
        ))
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
        Ok(MessageRef::new(
            self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000,
        ))
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
        Ok(MessageRef::new(
            self.next_message.fetch_add(1, Ordering::SeqCst) as u64 + 1000,
        ))
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
        _group: GroupId,
        _messages: &[MessageRef],
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn ban_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError> {
        self.state.lock().unwrap().banned.insert((group, user));
        Ok(())
    }

    async fn kick_member(&self, _group: GroupId, _user: UserId) -> Result<(), PlatformError> {
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

/// In-memory broadcast transport with a switchable primary failure.
#[derive(Default)]
pub struct MemoryChannel {
    texts: Mutex<Vec<(ChannelId, String)>>,
    documents: Mutex<Vec<(ChannelId, String, String, Vec<u8>)>>,
    fail_primary: AtomicBool,
}

impl MemoryChannel {
    /// Make every send to the primary exchange channel fail.
    pub fn fail_primary(&self) {
        self.fail_primary.store(true, Ordering::SeqCst);
    }

    /// Texts sent to one channel.
    pub fn texts_on(&self, channel: ChannelId) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Documents sent anywhere: (channel, caption, filename, bytes).
    pub fn documents(&self) -> Vec<(ChannelId, String, String, Vec<u8>)> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl BroadcastChannel for MemoryChannel {
    async fn send_text(&self, channel: ChannelId, text: &str) -> bool {
        if channel == EXCHANGE && self.fail_primary.load(Ordering::SeqCst) {
            return false;
        }
        self.texts
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

/// One wired service plus handles to its mocks and data directory.
pub struct TestEnv {
    /// The service under test.
    pub service: Arc<WardenService>,
    /// The platform mock behind it.
    pub platform: Arc<MockPlatform>,
    /// The broadcast transport behind it.
    pub channel: Arc<MemoryChannel>,
    dir: TempDir,
}

impl TestEnv {
    /// A fresh service over an empty temp data directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let (service, platform, channel) = Self::build(dir.path());
        TestEnv {
            service,
            platform,
            channel,
            dir,
        }
    }

    /// The standard test configuration rooted at `data_dir`.
    pub fn config(data_dir: &Path) -> WardenConfig {
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

    /// Grants a user admin rights in the standard group.
    pub fn grant_admin(&self, user: UserId) {
        self.service
            .groups()
            .set_admins(GROUP, HashSet::from([user]))
            .expect("set admins");
    }

    /// Drops the service and rebuilds it over the same data directory,
    /// as a process restart would.
    pub fn restart(self) -> Self {
        let TestEnv { service, dir, .. } = self;
        drop(service);
        let (service, platform, channel) = Self::build(dir.path());
        TestEnv {
            service,
            platform,
            channel,
            dir,
        }
    }

    /// Path to the data directory.
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    fn build(data_dir: &Path) -> (Arc<WardenService>, Arc<MockPlatform>, Arc<MemoryChannel>) {
        let platform = Arc::new(MockPlatform::default());
        let channel = Arc::new(MemoryChannel::default());
        let service = WardenService::new(
            Self::config(data_dir),
            Arc::clone(&platform) as Arc<dyn PlatformClient>,
            Arc::clone(&channel) as Arc<dyn BroadcastChannel>,
        )
        .expect("service construction");
        (service, platform, channel)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
