//! Chat-platform collaborator.
//!
//! The orchestrator talks to the platform only through [`Platform`], so the
//! coordination logic can run against [`fake::RecordingPlatform`] in tests
//! and against [`discord::DiscordClient`] in production.

pub mod discord;
pub mod fake;
pub mod message;

pub use discord::DiscordClient;
pub use message::{
    ActionRow, Button, ButtonStyle, Component, Embed, Modal, OutgoingMessage, TextInput,
    TextInputStyle,
};

use async_trait::async_trait;
use steward_core::{ChannelId, GuildId, MessageId, RoleId, UserId};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlatformError {
    #[error("missing permissions: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<f64> },

    #[error("platform request failed: {0}")]
    Http(String),
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Role ids held by a guild member.
    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, channel: ChannelId, message_id: MessageId)
        -> Result<(), PlatformError>;

    async fn message_exists(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> Result<bool, PlatformError>;

    async fn send_direct_message(
        &self,
        user: UserId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    async fn ban(&self, guild: GuildId, user: UserId, reason: &str) -> Result<(), PlatformError>;

    /// Replace the registered command catalog; returns how many commands the
    /// platform accepted.
    async fn register_commands(&self, catalog: &serde_json::Value) -> Result<usize, PlatformError>;
}
