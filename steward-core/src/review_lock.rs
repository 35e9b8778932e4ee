//! At-most-one-reviewer claims on applications.
//!
//! The table is plain data with `&mut self` operations. Each operation is a
//! complete check-then-act step, so a caller that holds the table behind a
//! mutex for the duration of one call can never observe a half-applied
//! acquisition.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::ids::{MessageId, UserId};

/// A reviewer's claim on one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewLock {
    pub holder: UserId,
    pub acquired_at: DateTime<Utc>,
}

impl ReviewLock {
    fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        // A clock that went backwards yields a negative age, which never expires.
        (now - self.acquired_at)
            .to_std()
            .is_ok_and(|age| age > idle_timeout)
    }
}

/// Result of [`ReviewLockTable::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    /// Someone else is reviewing; nothing was changed.
    HeldBy(UserId),
}

/// Map from application (review message) to its current reviewer.
#[derive(Debug, Default)]
pub struct ReviewLockTable {
    locks: HashMap<MessageId, ReviewLock>,
}

impl ReviewLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `item` for `actor`.
    ///
    /// Succeeds when the item is unclaimed or already held by `actor`; in both
    /// cases the acquisition time is refreshed to `now`.
    pub fn try_acquire(&mut self, item: MessageId, actor: UserId, now: DateTime<Utc>) -> Acquire {
        match self.locks.get(&item) {
            Some(lock) if lock.holder != actor => Acquire::HeldBy(lock.holder),
            _ => {
                self.locks.insert(
                    item,
                    ReviewLock {
                        holder: actor,
                        acquired_at: now,
                    },
                );
                Acquire::Acquired
            }
        }
    }

    /// Drop the claim on `item` regardless of who holds it.
    pub fn release(&mut self, item: MessageId) -> Option<ReviewLock> {
        self.locks.remove(&item)
    }

    pub fn holder(&self, item: MessageId) -> Option<UserId> {
        self.locks.get(&item).map(|lock| lock.holder)
    }

    pub fn get(&self, item: MessageId) -> Option<&ReviewLock> {
        self.locks.get(&item)
    }

    /// Remove and return every claim idle for longer than `idle_timeout`.
    pub fn sweep(&mut self, now: DateTime<Utc>, idle_timeout: Duration) -> Vec<MessageId> {
        let expired: Vec<MessageId> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.is_idle(now, idle_timeout))
            .map(|(item, _)| *item)
            .collect();

        for item in &expired {
            self.locks.remove(item);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const R1: UserId = UserId(11);
    const R2: UserId = UserId(22);
    const A1: MessageId = MessageId(1001);
    const A2: MessageId = MessageId(1002);

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_second_reviewer_sees_first_holder() {
        let mut table = ReviewLockTable::new();

        assert_eq!(table.try_acquire(A1, R1, t(0)), Acquire::Acquired);
        assert_eq!(table.try_acquire(A1, R2, t(1)), Acquire::HeldBy(R1));
        assert_eq!(table.holder(A1), Some(R1));
    }

    #[test]
    fn test_denied_acquisition_does_not_mutate() {
        let mut table = ReviewLockTable::new();
        table.try_acquire(A1, R1, t(0));
        table.try_acquire(A1, R2, t(50));

        let lock = table.get(A1).unwrap();
        assert_eq!(lock.holder, R1);
        assert_eq!(lock.acquired_at, t(0));
    }

    #[test]
    fn test_reacquire_by_holder_refreshes_timestamp() {
        let mut table = ReviewLockTable::new();
        table.try_acquire(A1, R1, t(0));

        assert_eq!(table.try_acquire(A1, R1, t(30)), Acquire::Acquired);
        let lock = table.get(A1).unwrap();
        assert_eq!(lock.holder, R1);
        assert_eq!(lock.acquired_at, t(30));
    }

    #[test]
    fn test_release_frees_item_for_others() {
        let mut table = ReviewLockTable::new();
        table.try_acquire(A1, R1, t(0));

        let released = table.release(A1).unwrap();
        assert_eq!(released.holder, R1);
        assert_eq!(table.try_acquire(A1, R2, t(1)), Acquire::Acquired);
    }

    #[test]
    fn test_release_of_unlocked_item_is_harmless() {
        let mut table = ReviewLockTable::new();
        assert_eq!(table.release(A1), None);
    }

    #[test]
    fn test_sweep_removes_only_idle_entries() {
        let mut table = ReviewLockTable::new();
        let timeout = Duration::from_secs(3600);
        table.try_acquire(A1, R1, t(0));
        table.try_acquire(A2, R2, t(3000));

        let expired = table.sweep(t(3601), timeout);

        assert_eq!(expired, vec![A1]);
        assert_eq!(table.holder(A1), None);
        assert_eq!(table.holder(A2), Some(R2));
    }

    #[test]
    fn test_sweep_boundary_is_exclusive() {
        let mut table = ReviewLockTable::new();
        table.try_acquire(A1, R1, t(0));

        assert!(table.sweep(t(3600), Duration::from_secs(3600)).is_empty());
        assert_eq!(table.sweep(t(3601), Duration::from_secs(3600)), vec![A1]);
    }

    #[test]
    fn test_refreshed_lock_survives_sweep() {
        let mut table = ReviewLockTable::new();
        let timeout = Duration::from_secs(60);
        table.try_acquire(A1, R1, t(0));
        table.try_acquire(A1, R1, t(59));

        assert!(table.sweep(t(61), timeout).is_empty());
        assert_eq!(table.holder(A1), Some(R1));
    }

    #[test]
    fn test_clock_going_backwards_never_expires() {
        let mut table = ReviewLockTable::new();
        table.try_acquire(A1, R1, t(100));

        assert!(table.sweep(t(0), Duration::ZERO).is_empty());
    }
}
