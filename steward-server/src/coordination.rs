//! Process-wide coordination tables.
//!
//! [`Coordinator`] owns the review-lock table and the muster ledger. Each
//! method takes the relevant mutex, runs one check-then-act step and releases
//! it before returning. None of them is `async`, so a guard can never be held
//! across a suspension point and two interactions on the same item cannot
//! interleave between the check and the mutation.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use steward_core::{
    Acquire, ChannelId, GuildId, JoinOutcome, JoinRejection, LeaveRejection, MessageId, Muster,
    MusterId, MusterLedger, MusterSpec, ReviewLock, ReviewLockTable, UserId,
};

#[derive(Debug, Default)]
pub struct Coordinator {
    reviews: Mutex<ReviewLockTable>,
    musters: Mutex<MusterLedger>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: no table operation leaves partial state behind.
    fn reviews(&self) -> MutexGuard<'_, ReviewLockTable> {
        self.reviews.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn musters(&self) -> MutexGuard<'_, MusterLedger> {
        self.musters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Review locks
    // =========================================================================

    pub fn try_acquire_review(&self, item: MessageId, actor: UserId, now: DateTime<Utc>) -> Acquire {
        self.reviews().try_acquire(item, actor, now)
    }

    pub fn release_review(&self, item: MessageId) -> Option<ReviewLock> {
        self.reviews().release(item)
    }

    pub fn review_holder(&self, item: MessageId) -> Option<UserId> {
        self.reviews().holder(item)
    }

    pub fn sweep_reviews(&self, now: DateTime<Utc>, idle_timeout: Duration) -> Vec<MessageId> {
        self.reviews().sweep(now, idle_timeout)
    }

    pub fn active_reviews(&self) -> usize {
        self.reviews().len()
    }

    // =========================================================================
    // Musters
    // =========================================================================

    pub fn create_muster(
        &self,
        id: MusterId,
        channel: ChannelId,
        spec: MusterSpec,
        now: DateTime<Utc>,
    ) -> Option<Muster> {
        self.musters().create(id, channel, spec, now)
    }

    pub fn restore_muster(&self, muster: Muster) -> bool {
        self.musters().restore(muster)
    }

    pub fn join_muster(&self, id: &MusterId, actor: UserId) -> Result<JoinOutcome, JoinRejection> {
        self.musters().join(id, actor)
    }

    pub fn leave_muster(&self, id: &MusterId, actor: UserId) -> Result<Muster, LeaveRejection> {
        self.musters().leave(id, actor)
    }

    pub fn expire_muster(&self, id: &MusterId, now: DateTime<Utc>) -> Option<Muster> {
        self.musters().expire(id, now)
    }

    pub fn remove_muster(&self, id: &MusterId) -> Option<Muster> {
        self.musters().remove(id)
    }

    pub fn muster(&self, id: &MusterId) -> Option<Muster> {
        self.musters().get(id).cloned()
    }

    pub fn musters_for(&self, guild: GuildId) -> Vec<Muster> {
        self.musters().for_guild(guild)
    }

    pub fn active_musters(&self) -> usize {
        self.musters().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_concurrent_acquisitions_have_one_winner() {
        let coordinator = Arc::new(Coordinator::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8u64)
            .map(|reviewer| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.try_acquire_review(MessageId(1), UserId(reviewer), now())
                })
            })
            .collect();

        let outcomes: Vec<Acquire> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes
            .iter()
            .filter(|outcome| **outcome == Acquire::Acquired)
            .count();
        assert_eq!(winners, 1);

        let holder = coordinator.review_holder(MessageId(1)).unwrap();
        for outcome in outcomes {
            if let Acquire::HeldBy(other) = outcome {
                assert_eq!(other, holder);
            }
        }
    }

    #[test]
    fn test_concurrent_joins_never_overfill() {
        let coordinator = Arc::new(Coordinator::new());
        let id = MusterId::new(1u64, 2u64);
        coordinator
            .create_muster(id, ChannelId(3), MusterSpec::new(3, None).unwrap(), now())
            .unwrap();
        let barrier = Arc::new(Barrier::new(10));

        let handles: Vec<_> = (0..10u64)
            .map(|user| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.join_muster(&id, UserId(user))
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let joined = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(JoinOutcome::Joined(_))))
            .count();
        let completed: Vec<&Muster> = outcomes
            .iter()
            .filter_map(|o| match o {
                Ok(JoinOutcome::Completed(muster)) => Some(muster),
                _ => None,
            })
            .collect();

        assert_eq!(joined, 2);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].members.len(), 3);
        assert!(coordinator.muster(&id).is_none());
    }
}
