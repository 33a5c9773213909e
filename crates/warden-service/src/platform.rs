//! The chat-platform surface the service drives.
//!
//! Everything the moderation logic needs from the underlying chat
//! platform fits behind one trait; a binary supplies the real client,
//! tests supply a recording mock.

use async_trait::async_trait;
use thiserror::Error;

use warden_core::types::{ChannelId, GroupId, MessageRef, UserId};

/// Errors a platform client reports back to the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The bot lacks the required permission in this group.
    #[error("Bot lacks permission for this operation")]
    Denied,

    /// The platform rejected or lost the request.
    #[error("Platform request failed: {0}")]
    Unavailable(String),
}

/// One entry of a group's admin roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatAdmin {
    /// The admin's account.
    pub user: UserId,
    /// Whether the account is a bot.
    pub is_bot: bool,
    /// May delete other members' messages.
    pub can_delete_messages: bool,
    /// May ban and unban members.
    pub can_restrict_members: bool,
}

/// Chat-platform operations used by the service.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Posts a message in a group, returning its reference.
    async fn send_message(&self, group: GroupId, text: &str)
        -> Result<MessageRef, PlatformError>;

    /// Posts a message carrying a callback button with the given payload.
    async fn send_message_with_button(
        &self,
        group: GroupId,
        text: &str,
        payload: &str,
    ) -> Result<MessageRef, PlatformError>;

    /// Posts a message to a service channel (log or debug traffic).
    async fn send_channel_message(
        &self,
        channel: ChannelId,
        text: &str,
    ) -> Result<MessageRef, PlatformError>;

    /// Edits a previously sent message.
    async fn edit_message(
        &self,
        group: GroupId,
        message: MessageRef,
        text: &str,
    ) -> Result<(), PlatformError>;

    /// Deletes messages in a group.
    async fn delete_messages(
        &self,
        group: GroupId,
        messages: &[MessageRef],
    ) -> Result<(), PlatformError>;

    /// Bans a member from a group.
    async fn ban_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError>;

    /// Removes a member without a standing ban; they may rejoin.
    async fn kick_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError>;

    /// Lifts a ban.
    async fn unban_member(&self, group: GroupId, user: UserId) -> Result<(), PlatformError>;

    /// Copies a message into an archive channel, returning the copy.
    async fn forward_message(
        &self,
        group: GroupId,
        message: MessageRef,
        to: ChannelId,
    ) -> Result<MessageRef, PlatformError>;

    /// The group's current admin roster.
    async fn get_admins(&self, group: GroupId) -> Result<Vec<ChatAdmin>, PlatformError>;

    /// Leaves a group.
    async fn leave_group(&self, group: GroupId) -> Result<(), PlatformError>;
}
