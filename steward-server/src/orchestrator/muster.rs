//! Musters: creation, sign-ups, completion and expiry.

use steward_core::{
    ChannelId, JoinOutcome, MessageId, Muster, MusterId, MusterSpec, UserId,
};
use tracing::{debug, error, info, warn};

use super::{Actor, Orchestrator, Reply, WorkflowError};
use crate::{render, scheduler};

impl Orchestrator {
    /// Post the board and start accepting sign-ups. Permission is checked by
    /// the caller.
    pub(super) async fn open_muster(
        &self,
        actor: &Actor,
        channel: ChannelId,
        spec: MusterSpec,
    ) -> Result<Reply, WorkflowError> {
        let now = self.clock.now();
        let draft = Muster::new(MusterId::new(actor.guild, 0u64), channel, spec, now);
        let message_id = self
            .platform
            .send_message(channel, &render::muster_board(&draft))
            .await?;

        let id = MusterId::new(actor.guild, message_id);
        let muster = self
            .coordinator
            .create_muster(id, channel, spec, now)
            .ok_or_else(|| {
                WorkflowError::Conflict("A muster already exists on that message.".to_string())
            })?;
        self.persist_muster(&muster).await;
        if let Some(deadline) = muster.deadline {
            scheduler::spawn_muster_expiry(self.clone(), id, deadline);
        }

        info!(
            "Muster {} opened by {} for {} members",
            id, actor.user, muster.capacity
        );
        Ok(Reply::text(format!(
            "✅ Muster created for {} members.",
            muster.capacity
        )))
    }

    pub async fn join_muster(&self, id: MusterId, user: UserId) -> Result<Reply, WorkflowError> {
        match self.coordinator.join_muster(&id, user)? {
            JoinOutcome::Joined(muster) => {
                self.persist_muster(&muster).await;
                self.refresh_board(&muster).await;
                Ok(Reply::text(format!(
                    "✅ You joined the muster ({}/{}).",
                    muster.count(),
                    muster.capacity
                )))
            }
            JoinOutcome::Completed(muster) => {
                self.complete_muster(&muster).await;
                Ok(Reply::text(
                    "🎊 You took the last slot. The muster is complete!",
                ))
            }
        }
    }

    pub async fn leave_muster(&self, id: MusterId, user: UserId) -> Result<Reply, WorkflowError> {
        let muster = self.coordinator.leave_muster(&id, user)?;
        self.persist_muster(&muster).await;
        self.refresh_board(&muster).await;
        Ok(Reply::text(format!(
            "You left the muster ({}/{}).",
            muster.count(),
            muster.capacity
        )))
    }

    /// Close a muster whose deadline has passed.
    ///
    /// Returns `None` when the muster already completed or expired.
    pub async fn expire_muster(&self, id: MusterId) -> Option<Muster> {
        let Some(muster) = self.coordinator.expire_muster(&id, self.clock.now()) else {
            debug!("Muster {} is already closed", id);
            return None;
        };
        info!(
            "Muster {} expired with {}/{} members",
            id,
            muster.count(),
            muster.capacity
        );

        if let Err(e) = self
            .platform
            .send_message(muster.channel_id, &render::muster_expired(&muster))
            .await
        {
            warn!("Could not post expiry summary for muster {}: {}", id, e);
        }
        if let Err(e) = self
            .platform
            .delete_message(muster.channel_id, id.message_id)
            .await
        {
            warn!("Could not delete board of muster {}: {}", id, e);
        }
        self.forget_muster(&id).await;
        Some(muster)
    }

    async fn complete_muster(&self, muster: &Muster) {
        info!("Muster {} is complete", muster.id);
        self.forget_muster(&muster.id).await;
        self.refresh_board(muster).await;
        if let Err(e) = self
            .platform
            .send_message(muster.channel_id, &render::muster_completed(muster))
            .await
        {
            warn!("Could not post roster of muster {}: {}", muster.id, e);
        }
        scheduler::spawn_completion_cleanup(self.clone(), muster.channel_id, muster.id.message_id);
    }

    /// Remove a completed muster's board. The posted roster stays.
    pub async fn clean_up_completed(&self, channel: ChannelId, message_id: MessageId) {
        if let Err(e) = self.platform.delete_message(channel, message_id).await {
            warn!("Could not delete completed muster {}: {}", message_id, e);
        }
    }

    async fn refresh_board(&self, muster: &Muster) {
        if let Err(e) = self
            .platform
            .edit_message(
                muster.channel_id,
                muster.id.message_id,
                &render::muster_board(muster),
            )
            .await
        {
            warn!("Could not update board of muster {}: {}", muster.id, e);
        }
    }

    // The in-memory ledger is authoritative; writes only need to be good
    // enough to rebuild it after a restart.
    async fn persist_muster(&self, muster: &Muster) {
        if let Err(e) = self.records.save_muster(muster).await {
            error!("Failed to persist muster {}: {}", muster.id, e);
        }
    }

    async fn forget_muster(&self, id: &MusterId) {
        if let Err(e) = self.records.delete_muster(id).await {
            error!("Failed to delete muster record {}: {}", id, e);
        }
    }

    /// Reload forming musters after a restart and re-arm their timers.
    /// Returns how many were restored.
    pub async fn restore_musters(&self) -> Result<usize, WorkflowError> {
        let mut restored = 0;
        for muster in self.records.musters().await? {
            let id = muster.id;
            let exists = self
                .platform
                .message_exists(muster.channel_id, id.message_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("Could not check board of muster {}: {}", id, e);
                    true
                });
            if !exists {
                info!("Board of muster {} is gone; dropping it", id);
                self.forget_muster(&id).await;
                continue;
            }

            let deadline = muster.deadline;
            if !self.coordinator.restore_muster(muster) {
                info!("Muster {} cannot be restored; dropping it", id);
                self.forget_muster(&id).await;
                continue;
            }
            restored += 1;
            if let Some(deadline) = deadline {
                scheduler::spawn_muster_expiry(self.clone(), id, deadline);
            }
        }
        info!("Restored {} musters", restored);
        Ok(restored)
    }
}
