//! Background timers: the periodic review-lock sweep and one-shot muster
//! timers.
//!
//! Timers never hold state of their own. A muster timer that fires after the
//! muster completed finds nothing in the ledger and does nothing.

use chrono::{DateTime, Utc};
use steward_core::{ChannelId, MessageId, MusterId};
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info};

use crate::orchestrator::Orchestrator;

pub async fn review_sweep_loop(orchestrator: Orchestrator) {
    let mut interval = interval(orchestrator.timing().sweep_interval);

    loop {
        interval.tick().await;
        sweep_once(&orchestrator).await;
    }
}

/// Reclaim idle review locks and drop their application records.
/// Returns the items that were reclaimed.
pub async fn sweep_once(orchestrator: &Orchestrator) -> Vec<MessageId> {
    let expired = orchestrator
        .coordinator()
        .sweep_reviews(orchestrator.now(), orchestrator.timing().review_idle_timeout);
    if expired.is_empty() {
        debug!("Review sweep: nothing idle");
        return expired;
    }

    info!("Review sweep reclaimed {} locks", expired.len());
    for item in &expired {
        match orchestrator
            .records()
            .delete_application_by_message(*item)
            .await
        {
            Ok(removed) => debug!("Dropped {} application records for {}", removed, item),
            Err(e) => error!("Failed to drop application records for {}: {}", item, e),
        }
    }
    expired
}

/// Expire a muster once its deadline has passed. A deadline already in the
/// past fires immediately.
pub fn spawn_muster_expiry(orchestrator: Orchestrator, id: MusterId, deadline: DateTime<Utc>) {
    debug!("Muster {} expires at {}", id, deadline);
    tokio::spawn(async move {
        // The timer and the clock can disagree by a few milliseconds.
        while orchestrator.now() < deadline {
            let wait = (deadline - orchestrator.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            sleep(wait).await;
        }
        orchestrator.expire_muster(id).await;
    });
}

/// Delete a completed muster's message after the cleanup delay.
pub fn spawn_completion_cleanup(orchestrator: Orchestrator, channel: ChannelId, message: MessageId) {
    tokio::spawn(async move {
        sleep(orchestrator.timing().muster_cleanup_delay).await;
        orchestrator.clean_up_completed(channel, message).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::command::SlashCommand;
    use crate::orchestrator::{Actor, Timing};
    use crate::platform::fake::{PlatformCall, RecordingPlatform};
    use crate::store::memory::InMemoryDocumentStore;
    use chrono::TimeZone;
    use std::sync::Arc;
    use steward_core::{Application, ApplicationAnswers, GuildId, UserId};

    const GUILD: GuildId = GuildId(1);
    const OWNER: UserId = UserId(99);

    struct Harness {
        orchestrator: Orchestrator,
        platform: Arc<RecordingPlatform>,
        clock: Arc<ManualClock>,
    }

    async fn harness() -> Harness {
        let platform = Arc::new(RecordingPlatform::new());
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let orchestrator = Orchestrator::new(
            platform.clone(),
            Arc::new(InMemoryDocumentStore::new()),
            clock.clone(),
            Timing::default(),
        );
        orchestrator.load_owners([OWNER]).await.unwrap();
        Harness {
            orchestrator,
            platform,
            clock,
        }
    }

    #[tokio::test]
    async fn test_sweep_reclaims_idle_locks_and_drops_records() {
        let h = harness().await;
        let item = MessageId(500);
        let application = Application::new(
            item,
            GUILD,
            ChannelId(2),
            UserId(3),
            ApplicationAnswers::default(),
            h.clock.now(),
        );
        h.orchestrator
            .records()
            .save_application(&application)
            .await
            .unwrap();
        h.orchestrator
            .coordinator()
            .try_acquire_review(item, UserId(4), h.clock.now());

        h.clock.advance(chrono::Duration::seconds(3600));
        assert!(sweep_once(&h.orchestrator).await.is_empty());

        h.clock.advance(chrono::Duration::seconds(1));
        assert_eq!(sweep_once(&h.orchestrator).await, vec![item]);
        assert_eq!(h.orchestrator.coordinator().review_holder(item), None);
        assert!(h
            .orchestrator
            .records()
            .application(GUILD, item)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_muster_expires_at_deadline() {
        let h = harness().await;
        let owner = Actor::new(GUILD, OWNER);
        h.orchestrator
            .run_command(
                &owner,
                ChannelId(7),
                SlashCommand::CreateMuster {
                    capacity: 3,
                    timer_minutes: Some(10),
                },
            )
            .await
            .unwrap();
        let (board, _, _) = h.platform.last_message().unwrap();
        let id = MusterId::new(GUILD, board);
        h.orchestrator.join_muster(id, UserId(5)).await.unwrap();

        h.clock.advance(chrono::Duration::minutes(9));
        sleep(Duration::from_secs(9 * 60)).await;
        assert!(h.orchestrator.muster(&id).is_some());

        h.clock.advance(chrono::Duration::minutes(2));
        sleep(Duration::from_secs(2 * 60)).await;
        assert!(h.orchestrator.muster(&id).is_none());
        assert!(h.platform.message(board).is_none());
        assert!(h.platform.calls().contains(&PlatformCall::Delete {
            channel: ChannelId(7),
            message_id: board,
        }));
        assert!(h
            .orchestrator
            .records()
            .musters()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_muster_message_is_cleaned_up() {
        let h = harness().await;
        let owner = Actor::new(GUILD, OWNER);
        h.orchestrator
            .run_command(
                &owner,
                ChannelId(7),
                SlashCommand::CreateMuster {
                    capacity: 2,
                    timer_minutes: Some(10),
                },
            )
            .await
            .unwrap();
        let (board, _, _) = h.platform.last_message().unwrap();
        let id = MusterId::new(GUILD, board);
        h.orchestrator.join_muster(id, UserId(5)).await.unwrap();
        h.orchestrator.join_muster(id, UserId(6)).await.unwrap();
        let (roster, _, _) = h.platform.last_message().unwrap();
        assert_ne!(roster, board);

        assert!(h.platform.message(board).is_some());
        sleep(Duration::from_secs(6)).await;
        assert!(h.platform.message(board).is_none());
        assert!(h.platform.message(roster).is_some());

        // The expiry timer finds nothing to do.
        h.clock.advance(chrono::Duration::minutes(11));
        sleep(Duration::from_secs(11 * 60)).await;
        let sends = h
            .platform
            .calls()
            .into_iter()
            .filter(|call| matches!(call, PlatformCall::Send { .. }))
            .count();
        assert_eq!(sends, 2);
    }
}
