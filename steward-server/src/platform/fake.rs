//! An in-process [`Platform`] that records every call.
//!
//! Used by unit and integration tests. Messages are numbered from 1001 and
//! kept in a table so edits and deletions can be asserted on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use steward_core::{ChannelId, GuildId, MessageId, RoleId, UserId};

use super::{OutgoingMessage, Platform, PlatformError};

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Send { channel: ChannelId, message_id: MessageId },
    Edit { channel: ChannelId, message_id: MessageId },
    Delete { channel: ChannelId, message_id: MessageId },
    DirectMessage { user: UserId },
    AddRole { guild: GuildId, user: UserId, role: RoleId },
    Ban { guild: GuildId, user: UserId, reason: String },
    RegisterCommands { count: usize },
}

#[derive(Debug, Default)]
struct State {
    next_message_id: u64,
    roles: HashMap<(GuildId, UserId), Vec<RoleId>>,
    messages: BTreeMap<MessageId, (ChannelId, OutgoingMessage)>,
    direct_messages: Vec<(UserId, OutgoingMessage)>,
    unreachable_users: HashSet<UserId>,
    forbid_roles: bool,
    forbid_bans: bool,
    calls: Vec<PlatformCall>,
}

#[derive(Debug)]
pub struct RecordingPlatform {
    state: Mutex<State>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_message_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_roles(&self, guild: GuildId, user: UserId, roles: Vec<RoleId>) {
        self.state().roles.insert((guild, user), roles);
    }

    /// Direct messages to `user` fail as if they had DMs closed.
    pub fn block_direct_messages(&self, user: UserId) {
        self.state().unreachable_users.insert(user);
    }

    pub fn forbid_role_changes(&self) {
        self.state().forbid_roles = true;
    }

    pub fn forbid_bans(&self) {
        self.state().forbid_bans = true;
    }

    /// Remove a message behind the bot's back.
    pub fn vanish(&self, message_id: MessageId) {
        self.state().messages.remove(&message_id);
    }

    /// Put a message in place without recording a call.
    pub fn seed_message(&self, channel: ChannelId, message_id: MessageId) {
        let mut state = self.state();
        state.next_message_id = state.next_message_id.max(message_id.0);
        state
            .messages
            .insert(message_id, (channel, OutgoingMessage::default()));
    }

    pub fn message(&self, message_id: MessageId) -> Option<OutgoingMessage> {
        self.state()
            .messages
            .get(&message_id)
            .map(|(_, message)| message.clone())
    }

    /// The most recently sent message still present, if any.
    pub fn last_message(&self) -> Option<(MessageId, ChannelId, OutgoingMessage)> {
        self.state()
            .messages
            .iter()
            .next_back()
            .map(|(id, (channel, message))| (*id, *channel, message.clone()))
    }

    pub fn direct_messages(&self, user: UserId) -> Vec<OutgoingMessage> {
        self.state()
            .direct_messages
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError> {
        Ok(self
            .state()
            .roles
            .get(&(guild, user))
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let mut state = self.state();
        state.next_message_id += 1;
        let message_id = MessageId(state.next_message_id);
        state.messages.insert(message_id, (channel, message.clone()));
        state.calls.push(PlatformCall::Send {
            channel,
            message_id,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        let slot = state
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| PlatformError::NotFound(format!("message {}", message_id)))?;
        *slot = (channel, message.clone());
        state.calls.push(PlatformCall::Edit {
            channel,
            message_id,
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state
            .messages
            .remove(&message_id)
            .ok_or_else(|| PlatformError::NotFound(format!("message {}", message_id)))?;
        state.calls.push(PlatformCall::Delete {
            channel,
            message_id,
        });
        Ok(())
    }

    async fn message_exists(
        &self,
        _channel: ChannelId,
        message_id: MessageId,
    ) -> Result<bool, PlatformError> {
        Ok(self.state().messages.contains_key(&message_id))
    }

    async fn send_direct_message(
        &self,
        user: UserId,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.unreachable_users.contains(&user) {
            return Err(PlatformError::Forbidden(
                "Cannot send messages to this user".to_string(),
            ));
        }
        state.direct_messages.push((user, message.clone()));
        state.calls.push(PlatformCall::DirectMessage { user });
        Ok(())
    }

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.forbid_roles {
            return Err(PlatformError::Forbidden("Missing Permissions".to_string()));
        }
        state.roles.entry((guild, user)).or_default().push(role);
        state.calls.push(PlatformCall::AddRole { guild, user, role });
        Ok(())
    }

    async fn ban(&self, guild: GuildId, user: UserId, reason: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.forbid_bans {
            return Err(PlatformError::Forbidden("Missing Permissions".to_string()));
        }
        state.calls.push(PlatformCall::Ban {
            guild,
            user,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn register_commands(&self, catalog: &serde_json::Value) -> Result<usize, PlatformError> {
        let count = catalog.as_array().map_or(0, Vec::len);
        self.state()
            .calls
            .push(PlatformCall::RegisterCommands { count });
        Ok(count)
    }
}
