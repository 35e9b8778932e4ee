//! Slash-command dispatch, guild configuration, role grants and the
//! blacklist, plus the unguarded operations behind the dashboard.

use serde::Serialize;
use steward_core::{
    parse_grant_list, Action, Application, ChannelId, GuildId, Muster, MusterId, MusterSpec,
    RoleId, UserId,
};
use tracing::info;

use super::{note_failure, Actor, Orchestrator, Reply, WorkflowError};
use crate::command::{catalog, SlashCommand};
use crate::records::{BlacklistEntry, GuildSettings};
use crate::render;

/// Form contents submitted through the setup modal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPost {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub color: Option<String>,
}

/// Snapshot counts for `/api/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub active_reviews: usize,
    pub active_musters: usize,
    pub pending_applications: usize,
}

impl Orchestrator {
    /// Run a slash command. Every command passes the same permission gate
    /// before anything else happens.
    pub async fn run_command(
        &self,
        actor: &Actor,
        channel: ChannelId,
        command: SlashCommand,
    ) -> Result<Reply, WorkflowError> {
        info!("{} invoked by {} in guild {}", command, actor.user, actor.guild);
        self.authorize(actor, command.action()).await?;

        match command {
            SlashCommand::Help => self.help(actor).await,
            SlashCommand::Sync => self.sync_commands().await,
            SlashCommand::ManageRoles {
                role,
                actions,
                reset,
            } => self.manage_roles(actor.guild, role, actions, reset).await,
            SlashCommand::AddForm { channel } => {
                Ok(Reply::Modal(render::form_setup_modal(channel)))
            }
            SlashCommand::ApprovalChannel { channel } => {
                self.set_review_channel(actor.guild, channel).await
            }
            SlashCommand::GiveApprover {
                approver_role,
                approved_role,
            } => {
                self.set_roles(actor.guild, approver_role, approved_role)
                    .await
            }
            SlashCommand::CreateMuster {
                capacity,
                timer_minutes,
            } => {
                let spec = MusterSpec::new(capacity, timer_minutes)?;
                self.open_muster(actor, channel, spec).await
            }
            SlashCommand::BlacklistChannel { channel } => {
                self.set_blacklist_channel(actor.guild, channel).await
            }
            SlashCommand::Blacklist {
                user,
                static_id,
                reason,
            } => {
                let warnings = self
                    .add_to_blacklist(actor.guild, user, static_id, reason, actor.user)
                    .await?;
                Ok(Reply::with_warnings(
                    format!("⛔ {} has been blacklisted.", user.mention()),
                    warnings,
                ))
            }
            SlashCommand::Unblacklist { user } => {
                let warnings = self
                    .remove_from_blacklist(actor.guild, user, actor.user)
                    .await?;
                Ok(Reply::with_warnings(
                    format!("✅ {} has been removed from the blacklist.", user.mention()),
                    warnings,
                ))
            }
        }
    }

    async fn help(&self, actor: &Actor) -> Result<Reply, WorkflowError> {
        let actions = self.permitted_actions(actor).await?;
        let visible: Vec<Action> = actions
            .into_iter()
            .filter(|action| *action != Action::Review)
            .collect();
        Ok(Reply::embed(render::help(&visible)))
    }

    async fn sync_commands(&self) -> Result<Reply, WorkflowError> {
        let count = self.platform.register_commands(&catalog()).await?;
        info!("Registered {} commands", count);
        Ok(Reply::text(format!("🔄 Synced {} commands.", count)))
    }

    async fn manage_roles(
        &self,
        guild: GuildId,
        role: RoleId,
        actions: Option<String>,
        reset: bool,
    ) -> Result<Reply, WorkflowError> {
        if reset {
            self.records
                .set_role_grant(guild, role, Default::default())
                .await?;
            info!("Reset grants of role {} in guild {}", role, guild);
            return Ok(Reply::text(format!(
                "🧹 Permissions of {} have been reset.",
                role.mention()
            )));
        }

        let Some(text) = actions else {
            let current = self.records.role_grant(guild, role).await?;
            let listing = if current.is_empty() {
                "no permissions".to_string()
            } else {
                join_actions(current)
            };
            return Ok(Reply::text(format!("{} has {}.", role.mention(), listing)));
        };

        let granted = parse_grant_list(&text).map_err(|e| {
            WorkflowError::InvalidInput(format!(
                "{}. Grantable actions: {}",
                e,
                join_actions(Action::grantable())
            ))
        })?;
        let listing = join_actions(granted.iter().copied());
        self.records.set_role_grant(guild, role, granted).await?;
        info!("Role {} in guild {} now has {}", role, guild, listing);
        Ok(Reply::text(format!(
            "✅ {} can now use {}.",
            role.mention(),
            listing
        )))
    }

    // =========================================================================
    // Guild settings
    // =========================================================================

    /// Apply `update` to a guild's settings and persist the result.
    async fn update_settings(
        &self,
        guild: GuildId,
        update: impl FnOnce(&mut GuildSettings),
    ) -> Result<GuildSettings, WorkflowError> {
        let mut settings = self.records.settings(guild).await?;
        update(&mut settings);
        self.records.save_settings(guild, &settings).await?;
        Ok(settings)
    }

    async fn set_review_channel(
        &self,
        guild: GuildId,
        channel: Option<ChannelId>,
    ) -> Result<Reply, WorkflowError> {
        self.update_settings(guild, |s| s.review_channel_id = channel)
            .await?;
        info!("Review channel of guild {} set to {:?}", guild, channel);
        Ok(Reply::text(match channel {
            Some(channel) => format!("✅ Applications will be posted to {}.", channel.mention()),
            None => "✅ The review channel has been cleared.".to_string(),
        }))
    }

    async fn set_roles(
        &self,
        guild: GuildId,
        approver: RoleId,
        approved: RoleId,
    ) -> Result<Reply, WorkflowError> {
        self.update_settings(guild, |s| {
            s.approver_role_id = Some(approver);
            s.approved_role_id = Some(approved);
        })
        .await?;
        info!(
            "Guild {} approver role {}, approved role {}",
            guild, approver, approved
        );
        Ok(Reply::text(format!(
            "✅ {} can review applications; approved applicants receive {}.",
            approver.mention(),
            approved.mention()
        )))
    }

    async fn set_blacklist_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Reply, WorkflowError> {
        self.update_settings(guild, |s| s.blacklist_channel_id = Some(channel))
            .await?;
        info!("Blacklist channel of guild {} set to {}", guild, channel);
        Ok(Reply::text(format!(
            "✅ Blacklist reports will be posted to {}.",
            channel.mention()
        )))
    }

    // =========================================================================
    // Application form
    // =========================================================================

    /// Post the application form with its Apply button to `channel`.
    pub async fn post_form(
        &self,
        actor: &Actor,
        channel: ChannelId,
        form: FormPost,
    ) -> Result<Reply, WorkflowError> {
        self.authorize(actor, Action::AddForm).await?;

        let title = form.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "The form needs a title.".to_string(),
            ));
        }
        let color = match form.color.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(render::parse_color(text).ok_or_else(|| {
                WorkflowError::InvalidInput(format!(
                    "`{}` is not a hex colour like #ff0000.",
                    text
                ))
            })?),
        };

        let post = render::application_form_post(
            title,
            form.description.trim(),
            color,
            form.image_url.as_deref(),
        );
        self.platform.send_message(channel, &post).await?;
        self.update_settings(actor.guild, |s| s.form_channel_id = Some(channel))
            .await?;
        info!("Application form posted to {} by {}", channel, actor.user);
        Ok(Reply::text(format!(
            "✅ The application form has been posted to {}.",
            channel.mention()
        )))
    }

    // =========================================================================
    // Blacklist
    // =========================================================================

    /// Record a blacklist entry, report it and ban the user. Returns the
    /// best-effort steps that failed.
    pub async fn add_to_blacklist(
        &self,
        guild: GuildId,
        user: UserId,
        static_id: String,
        reason: String,
        reporter: UserId,
    ) -> Result<Vec<String>, WorkflowError> {
        let settings = self.records.settings(guild).await?;
        let report_channel = settings
            .blacklist_channel_id
            .ok_or(WorkflowError::NotConfigured {
                what: "The blacklist channel",
            })?;
        if self.records.blacklist_entry(guild, user).await?.is_some() {
            return Err(WorkflowError::Conflict(format!(
                "ℹ️ {} is already blacklisted.",
                user.mention()
            )));
        }

        let entry = BlacklistEntry {
            guild_id: guild,
            user_id: user,
            static_id,
            reason,
            reporter_id: reporter,
            created_at: self.clock.now(),
        };
        self.records.save_blacklist_entry(&entry).await?;
        info!("{} blacklisted in guild {} by {}", user, guild, reporter);

        let mut warnings = Vec::new();
        note_failure(
            &mut warnings,
            "post the blacklist report",
            self.platform
                .send_message(report_channel, &render::blacklist_report(&entry))
                .await,
        );
        note_failure(
            &mut warnings,
            "ban the user",
            self.platform.ban(guild, user, &entry.reason).await,
        );
        Ok(warnings)
    }

    pub async fn remove_from_blacklist(
        &self,
        guild: GuildId,
        user: UserId,
        actor: UserId,
    ) -> Result<Vec<String>, WorkflowError> {
        if !self.records.delete_blacklist_entry(guild, user).await? {
            return Err(WorkflowError::NotFound {
                what: "That blacklist entry",
            });
        }
        info!("{} removed from the blacklist of guild {} by {}", user, guild, actor);

        let mut warnings = Vec::new();
        if let Some(channel) = self.records.settings(guild).await?.blacklist_channel_id {
            note_failure(
                &mut warnings,
                "post the removal report",
                self.platform
                    .send_message(channel, &render::blacklist_removed(user, actor))
                    .await,
            );
        }
        Ok(warnings)
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    pub async fn guild_settings(&self, guild: GuildId) -> Result<GuildSettings, WorkflowError> {
        Ok(self.records.settings(guild).await?)
    }

    pub async fn replace_guild_settings(
        &self,
        guild: GuildId,
        settings: GuildSettings,
    ) -> Result<GuildSettings, WorkflowError> {
        self.records.save_settings(guild, &settings).await?;
        info!("Settings of guild {} replaced from the dashboard", guild);
        Ok(settings)
    }

    pub async fn applications(
        &self,
        guild: Option<GuildId>,
    ) -> Result<Vec<Application>, WorkflowError> {
        Ok(self.records.applications(guild).await?)
    }

    pub fn musters(&self, guild: GuildId) -> Vec<Muster> {
        self.coordinator.musters_for(guild)
    }

    pub fn muster(&self, id: &MusterId) -> Option<Muster> {
        self.coordinator.muster(id)
    }

    pub async fn blacklist(&self, guild: GuildId) -> Result<Vec<BlacklistEntry>, WorkflowError> {
        Ok(self.records.blacklist(guild).await?)
    }

    pub async fn status(&self) -> Result<Status, WorkflowError> {
        Ok(Status {
            active_reviews: self.coordinator.active_reviews(),
            active_musters: self.coordinator.active_musters(),
            pending_applications: self.records.applications(None).await?.len(),
        })
    }
}

fn join_actions(actions: impl IntoIterator<Item = Action>) -> String {
    actions
        .into_iter()
        .map(|action| format!("`{}`", action))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_actions() {
        assert_eq!(
            join_actions([Action::Blacklist, Action::Review]),
            "`blacklist`, `review`"
        );
        assert_eq!(join_actions(Vec::new()), "");
    }
}
