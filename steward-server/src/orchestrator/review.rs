//! Membership applications: submission, review and the decision.

use steward_core::{
    Acquire, Action, Application, ApplicationAnswers, Decision, GuildId, MessageId,
};
use tracing::{error, info, warn};

use super::{note_failure, Actor, Orchestrator, Reply, WorkflowError};
use crate::render;

impl Orchestrator {
    /// The modal behind the form's Apply button.
    pub fn application_form(&self) -> Reply {
        Reply::Modal(render::application_modal())
    }

    /// Post a submitted form to the review channel and record it.
    pub async fn submit_application(
        &self,
        actor: &Actor,
        answers: ApplicationAnswers,
    ) -> Result<Reply, WorkflowError> {
        let settings = self.records.settings(actor.guild).await?;
        let review_channel = settings
            .review_channel_id
            .ok_or(WorkflowError::NotConfigured {
                what: "The application review channel",
            })?;

        if self
            .records
            .open_application_for(actor.guild, actor.user)
            .await?
            .is_some()
        {
            return Err(WorkflowError::Conflict(
                "ℹ️ You already have an application waiting for review.".to_string(),
            ));
        }

        // The card does not show its own message id, so it can be rendered
        // before the id is known.
        let mut application = Application::new(
            MessageId(0),
            actor.guild,
            review_channel,
            actor.user,
            answers,
            self.clock.now(),
        );
        let card = render::application_review(&application, settings.approver_role_id);
        application.message_id = self.platform.send_message(review_channel, &card).await?;
        self.records.save_application(&application).await?;

        info!(
            "Application {} from {} posted to {}",
            application.message_id, actor.user, review_channel
        );
        Ok(Reply::text("✅ Your application has been submitted."))
    }

    fn acquire_review(&self, actor: &Actor, message_id: MessageId) -> Result<(), WorkflowError> {
        match self
            .coordinator
            .try_acquire_review(message_id, actor.user, self.clock.now())
        {
            Acquire::Acquired => Ok(()),
            Acquire::HeldBy(holder) => Err(WorkflowError::UnderReview { holder }),
        }
    }

    /// Load an application that is still awaiting a decision.
    async fn open_application(
        &self,
        guild: GuildId,
        message_id: MessageId,
    ) -> Result<Application, WorkflowError> {
        match self.records.application(guild, message_id).await? {
            Some(application) if !application.status.is_terminal() => Ok(application),
            _ => Err(WorkflowError::NotFound {
                what: "This application",
            }),
        }
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        message_id: MessageId,
    ) -> Result<Reply, WorkflowError> {
        self.authorize(actor, Action::Review).await?;
        self.acquire_review(actor, message_id)?;
        let result = self.finalize(actor, message_id, Decision::Approve).await;
        self.coordinator.release_review(message_id);
        result
    }

    /// First half of a denial: lock the application and ask for a reason.
    ///
    /// The lock stays with the reviewer until the reason is submitted or the
    /// idle sweep reclaims it.
    pub async fn begin_deny(
        &self,
        actor: &Actor,
        message_id: MessageId,
    ) -> Result<Reply, WorkflowError> {
        self.authorize(actor, Action::Review).await?;
        self.acquire_review(actor, message_id)?;
        match self.open_application(actor.guild, message_id).await {
            Ok(mut application) => {
                if application.start_review() {
                    if let Err(e) = self.records.save_application(&application).await {
                        error!("Failed to mark application {} under review: {}", message_id, e);
                    }
                }
                Ok(Reply::Modal(render::deny_reason_modal(message_id)))
            }
            Err(e) => {
                self.coordinator.release_review(message_id);
                Err(e)
            }
        }
    }

    pub async fn deny(
        &self,
        actor: &Actor,
        message_id: MessageId,
        reason: String,
    ) -> Result<Reply, WorkflowError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "A reason is required to deny an application.".to_string(),
            ));
        }

        self.authorize(actor, Action::Review).await?;
        self.acquire_review(actor, message_id)?;
        let result = self
            .finalize(actor, message_id, Decision::Deny { reason })
            .await;
        self.coordinator.release_review(message_id);
        result
    }

    /// Record the decision and notify everyone involved. The caller holds the
    /// review lock and releases it afterwards.
    async fn finalize(
        &self,
        actor: &Actor,
        message_id: MessageId,
        decision: Decision,
    ) -> Result<Reply, WorkflowError> {
        let settings = self.records.settings(actor.guild).await?;
        let mut application = self.open_application(actor.guild, message_id).await?;
        application.decide(&decision);
        self.records.save_application(&application).await?;

        let applicant = application.applicant_id;
        let mut warnings = Vec::new();
        match &decision {
            Decision::Approve => {
                note_failure(
                    &mut warnings,
                    "send the applicant a direct message",
                    self.platform
                        .send_direct_message(applicant, &render::approval_notice())
                        .await,
                );
                match settings.approved_role_id {
                    Some(role) => note_failure(
                        &mut warnings,
                        "give the applicant the approved role",
                        self.platform.add_role(actor.guild, applicant, role).await,
                    ),
                    None => warnings.push("No approved role is configured.".to_string()),
                }
            }
            Decision::Deny { reason } => note_failure(
                &mut warnings,
                "send the applicant a direct message",
                self.platform
                    .send_direct_message(applicant, &render::denial_notice(reason))
                    .await,
            ),
        }
        note_failure(
            &mut warnings,
            "update the application card",
            self.platform
                .edit_message(
                    application.channel_id,
                    message_id,
                    &render::application_decided(&application, actor.user, &decision),
                )
                .await,
        );

        if let Err(e) = self.records.delete_application(actor.guild, message_id).await {
            error!("Failed to delete decided application {}: {}", message_id, e);
        }

        info!(
            "Application {} from {} {} by {}",
            message_id, applicant, application.status, actor.user
        );
        let summary = match decision {
            Decision::Approve => format!("✅ Approved {}.", applicant.mention()),
            Decision::Deny { .. } => format!("❌ Denied {}.", applicant.mention()),
        };
        Ok(Reply::with_warnings(summary, warnings))
    }

    /// Drop stored applications whose review card has disappeared.
    /// Returns how many remain.
    pub async fn restore_applications(&self) -> Result<usize, WorkflowError> {
        let mut kept = 0;
        for application in self.records.applications(None).await? {
            let exists = self
                .platform
                .message_exists(application.channel_id, application.message_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(
                        "Could not check application card {}: {}",
                        application.message_id, e
                    );
                    true
                });
            if exists {
                kept += 1;
            } else {
                info!(
                    "Review card {} is gone; dropping its application",
                    application.message_id
                );
                self.records
                    .delete_application(application.guild_id, application.message_id)
                    .await?;
            }
        }
        Ok(kept)
    }
}
