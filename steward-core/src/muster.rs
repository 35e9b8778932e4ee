//! Capacity-bounded musters (self-service sign-up lists).
//!
//! A muster is **forming** while it sits in the ledger's active set. It leaves
//! the set exactly once, either because the last free slot was taken
//! (**complete**) or because its deadline passed first (**expired**). Both
//! terminal transitions remove the record, so whichever happens second finds
//! nothing and does nothing; completion inside a join therefore always wins
//! over a deadline that fires later.

use chrono::{DateTime, Duration as TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{JoinRejection, LeaveRejection, ValidationError};
use crate::ids::{ChannelId, GuildId, MusterId, UserId};

pub const MIN_CAPACITY: usize = 2;
pub const MAX_CAPACITY: usize = 50;
pub const MIN_TIMER_MINUTES: u32 = 1;
pub const MAX_TIMER_MINUTES: u32 = 1440;

/// Validated creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusterSpec {
    capacity: usize,
    timer_minutes: Option<u32>,
}

impl MusterSpec {
    /// Validate raw command input. Nothing is created on error.
    pub fn new(capacity: i64, timer_minutes: Option<i64>) -> Result<Self, ValidationError> {
        let capacity = usize::try_from(capacity)
            .ok()
            .filter(|c| (MIN_CAPACITY..=MAX_CAPACITY).contains(c))
            .ok_or(ValidationError::CapacityOutOfRange { capacity })?;

        let timer_minutes = timer_minutes
            .map(|minutes| {
                u32::try_from(minutes)
                    .ok()
                    .filter(|m| (MIN_TIMER_MINUTES..=MAX_TIMER_MINUTES).contains(m))
                    .ok_or(ValidationError::TimerOutOfRange { minutes })
            })
            .transpose()?;

        Ok(Self {
            capacity,
            timer_minutes,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn timer_minutes(&self) -> Option<u32> {
        self.timer_minutes
    }
}

/// One forming muster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Muster {
    pub id: MusterId,
    pub channel_id: ChannelId,
    pub capacity: usize,
    /// Members in join order; never contains duplicates.
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub timer_minutes: Option<u32>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl Muster {
    pub fn new(id: MusterId, channel_id: ChannelId, spec: MusterSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            channel_id,
            capacity: spec.capacity,
            members: Vec::new(),
            created_at: now,
            timer_minutes: spec.timer_minutes,
            deadline: spec
                .timer_minutes
                .map(|minutes| now + TimeDelta::minutes(i64::from(minutes))),
        }
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The actor was added and the muster is still forming.
    Joined(Muster),
    /// The actor took the last slot. The muster has already been removed from
    /// the active set; this is its final roster.
    Completed(Muster),
}

impl JoinOutcome {
    pub fn muster(&self) -> &Muster {
        match self {
            JoinOutcome::Joined(muster) | JoinOutcome::Completed(muster) => muster,
        }
    }
}

/// The set of forming musters.
#[derive(Debug, Default)]
pub struct MusterLedger {
    active: HashMap<MusterId, Muster>,
}

impl MusterLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new forming muster.
    ///
    /// Returns `None` (and changes nothing) if a muster with this id is
    /// already forming.
    pub fn create(
        &mut self,
        id: MusterId,
        channel_id: ChannelId,
        spec: MusterSpec,
        now: DateTime<Utc>,
    ) -> Option<Muster> {
        if self.active.contains_key(&id) {
            return None;
        }
        let muster = Muster::new(id, channel_id, spec, now);
        self.active.insert(id, muster.clone());
        Some(muster)
    }

    /// Put a previously persisted muster back into the active set.
    ///
    /// Records that are already full are not restored: they completed before
    /// the previous process could clean them up.
    pub fn restore(&mut self, mut muster: Muster) -> bool {
        let mut seen = Vec::with_capacity(muster.members.len());
        muster.members.retain(|member| {
            if seen.contains(member) {
                false
            } else {
                seen.push(*member);
                true
            }
        });
        if muster.is_full() {
            return false;
        }
        self.active.insert(muster.id, muster);
        true
    }

    pub fn join(&mut self, id: &MusterId, actor: UserId) -> Result<JoinOutcome, JoinRejection> {
        let muster = self.active.get_mut(id).ok_or(JoinRejection::NotFound)?;

        if muster.is_full() {
            return Err(JoinRejection::Full {
                capacity: muster.capacity,
            });
        }
        if muster.has_member(actor) {
            return Err(JoinRejection::AlreadyMember);
        }

        muster.members.push(actor);

        if muster.is_full() {
            let completed = self.active.remove(id).ok_or(JoinRejection::NotFound)?;
            Ok(JoinOutcome::Completed(completed))
        } else {
            Ok(JoinOutcome::Joined(muster.clone()))
        }
    }

    /// Remove `actor` from a forming muster, returning the updated roster.
    pub fn leave(&mut self, id: &MusterId, actor: UserId) -> Result<Muster, LeaveRejection> {
        let muster = self.active.get_mut(id).ok_or(LeaveRejection::NotFound)?;
        let position = muster
            .members
            .iter()
            .position(|member| *member == actor)
            .ok_or(LeaveRejection::NotMember)?;
        muster.members.remove(position);
        Ok(muster.clone())
    }

    /// Close a muster whose deadline has passed.
    ///
    /// Returns the roster at the moment of expiry, or `None` when there is
    /// nothing to do: the muster completed (or was removed) already, it has no
    /// deadline, or the deadline is still in the future.
    pub fn expire(&mut self, id: &MusterId, now: DateTime<Utc>) -> Option<Muster> {
        let due = self
            .active
            .get(id)
            .is_some_and(|muster| muster.is_past_deadline(now));
        if due {
            self.active.remove(id)
        } else {
            None
        }
    }

    /// Drop a muster without a terminal transition (e.g. its message vanished).
    pub fn remove(&mut self, id: &MusterId) -> Option<Muster> {
        self.active.remove(id)
    }

    pub fn get(&self, id: &MusterId) -> Option<&Muster> {
        self.active.get(id)
    }

    pub fn for_guild(&self, guild_id: GuildId) -> Vec<Muster> {
        let mut musters: Vec<Muster> = self
            .active
            .values()
            .filter(|muster| muster.id.guild_id == guild_id)
            .cloned()
            .collect();
        musters.sort_by_key(|muster| muster.created_at);
        musters
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const X: UserId = UserId(1);
    const Y: UserId = UserId(2);
    const Z: UserId = UserId(3);

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn id() -> MusterId {
        MusterId::new(10u64, 500u64)
    }

    fn ledger_with(capacity: i64, timer: Option<i64>) -> MusterLedger {
        let mut ledger = MusterLedger::new();
        let spec = MusterSpec::new(capacity, timer).unwrap();
        ledger.create(id(), ChannelId(7), spec, t(0)).unwrap();
        ledger
    }

    #[test]
    fn test_spec_bounds() {
        assert!(MusterSpec::new(2, None).is_ok());
        assert!(MusterSpec::new(50, Some(1440)).is_ok());
        assert_eq!(
            MusterSpec::new(1, None),
            Err(ValidationError::CapacityOutOfRange { capacity: 1 })
        );
        assert_eq!(
            MusterSpec::new(51, None),
            Err(ValidationError::CapacityOutOfRange { capacity: 51 })
        );
        assert_eq!(
            MusterSpec::new(-3, None),
            Err(ValidationError::CapacityOutOfRange { capacity: -3 })
        );
        assert_eq!(
            MusterSpec::new(5, Some(0)),
            Err(ValidationError::TimerOutOfRange { minutes: 0 })
        );
        assert_eq!(
            MusterSpec::new(5, Some(1441)),
            Err(ValidationError::TimerOutOfRange { minutes: 1441 })
        );
    }

    #[test]
    fn test_deadline_is_creation_plus_timer() {
        let ledger = ledger_with(3, Some(15));
        let muster = ledger.get(&id()).unwrap();
        assert_eq!(muster.deadline, Some(t(15 * 60)));
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let mut ledger = ledger_with(3, None);
        let spec = MusterSpec::new(9, None).unwrap();
        assert!(ledger.create(id(), ChannelId(7), spec, t(1)).is_none());
        assert_eq!(ledger.get(&id()).unwrap().capacity, 3);
    }

    #[test]
    fn test_capacity_three_completes_on_third_join() {
        let mut ledger = ledger_with(3, None);

        assert!(matches!(ledger.join(&id(), X), Ok(JoinOutcome::Joined(m)) if m.count() == 1));
        assert!(matches!(ledger.join(&id(), Y), Ok(JoinOutcome::Joined(m)) if m.count() == 2));
        match ledger.join(&id(), Z) {
            Ok(JoinOutcome::Completed(muster)) => assert_eq!(muster.members, vec![X, Y, Z]),
            other => panic!("expected completion, got {:?}", other),
        }
        assert!(ledger.get(&id()).is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_double_join_is_already_member() {
        let mut ledger = ledger_with(3, None);
        ledger.join(&id(), X).unwrap();

        assert_eq!(ledger.join(&id(), X), Err(JoinRejection::AlreadyMember));
        assert_eq!(ledger.get(&id()).unwrap().members, vec![X]);
    }

    #[test]
    fn test_join_after_completion_is_not_found() {
        let mut ledger = ledger_with(2, None);
        ledger.join(&id(), X).unwrap();
        ledger.join(&id(), Y).unwrap();

        assert_eq!(ledger.join(&id(), Z), Err(JoinRejection::NotFound));
    }

    #[test]
    fn test_join_restored_full_record_is_full() {
        let mut ledger = MusterLedger::new();
        let spec = MusterSpec::new(2, None).unwrap();
        let mut muster = Muster::new(id(), ChannelId(7), spec, t(0));
        muster.members = vec![X];
        assert!(ledger.restore(muster));
        // Shrinking capacity out from under a forming muster is the only way to
        // observe a full record in the active set.
        ledger.active.get_mut(&id()).unwrap().capacity = 1;

        assert_eq!(ledger.join(&id(), Y), Err(JoinRejection::Full { capacity: 1 }));
    }

    #[test]
    fn test_leave() {
        let mut ledger = ledger_with(3, None);
        ledger.join(&id(), X).unwrap();
        ledger.join(&id(), Y).unwrap();

        let muster = ledger.leave(&id(), X).unwrap();
        assert_eq!(muster.members, vec![Y]);
        assert_eq!(ledger.leave(&id(), X), Err(LeaveRejection::NotMember));
        assert_eq!(ledger.leave(&id(), Z), Err(LeaveRejection::NotMember));
    }

    #[test]
    fn test_leave_missing_muster_is_not_found() {
        let mut ledger = MusterLedger::new();
        assert_eq!(ledger.leave(&id(), X), Err(LeaveRejection::NotFound));
    }

    #[test]
    fn test_expire_after_deadline_lists_joined_members() {
        let mut ledger = ledger_with(2, Some(1));
        ledger.join(&id(), X).unwrap();

        assert!(ledger.expire(&id(), t(59)).is_none());
        let expired = ledger.expire(&id(), t(60)).unwrap();
        assert_eq!(expired.members, vec![X]);
        assert!(ledger.get(&id()).is_none());
    }

    #[test]
    fn test_expire_after_completion_is_noop() {
        let mut ledger = ledger_with(2, Some(1));
        ledger.join(&id(), X).unwrap();
        assert!(matches!(
            ledger.join(&id(), Y),
            Ok(JoinOutcome::Completed(_))
        ));

        assert!(ledger.expire(&id(), t(3600)).is_none());
    }

    #[test]
    fn test_expire_without_deadline_is_noop() {
        let mut ledger = ledger_with(2, None);
        assert!(ledger.expire(&id(), t(1_000_000)).is_none());
        assert!(ledger.get(&id()).is_some());
    }

    #[test]
    fn test_restore_skips_full_records_and_dedups() {
        let mut ledger = MusterLedger::new();
        let spec = MusterSpec::new(3, None).unwrap();

        let mut full = Muster::new(id(), ChannelId(7), spec, t(0));
        full.members = vec![X, Y, Z];
        assert!(!ledger.restore(full));

        let mut duplicated = Muster::new(id(), ChannelId(7), spec, t(0));
        duplicated.members = vec![X, X, Y];
        assert!(ledger.restore(duplicated));
        assert_eq!(ledger.get(&id()).unwrap().members, vec![X, Y]);
    }

    #[test]
    fn test_for_guild_filters_and_orders() {
        let mut ledger = MusterLedger::new();
        let spec = MusterSpec::new(3, None).unwrap();
        ledger
            .create(MusterId::new(1u64, 2u64), ChannelId(1), spec, t(10))
            .unwrap();
        ledger
            .create(MusterId::new(1u64, 1u64), ChannelId(1), spec, t(20))
            .unwrap();
        ledger
            .create(MusterId::new(2u64, 3u64), ChannelId(1), spec, t(0))
            .unwrap();

        let ids: Vec<MusterId> = ledger
            .for_guild(GuildId(1))
            .into_iter()
            .map(|muster| muster.id)
            .collect();
        assert_eq!(
            ids,
            vec![MusterId::new(1u64, 2u64), MusterId::new(1u64, 1u64)]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join(u64),
        Leave(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..8).prop_map(Op::Join),
            (0u64..8).prop_map(Op::Leave),
        ]
    }

    proptest! {
        #[test]
        fn prop_membership_invariants_hold(capacity in 2i64..6, ops in proptest::collection::vec(op(), 0..40)) {
            let mut ledger = ledger_with(capacity, None);
            let mut completions = 0;

            for op in ops {
                match op {
                    Op::Join(user) => {
                        if let Ok(JoinOutcome::Completed(muster)) = ledger.join(&id(), UserId(user)) {
                            completions += 1;
                            prop_assert_eq!(muster.members.len(), capacity as usize);
                        }
                    }
                    Op::Leave(user) => {
                        let _ = ledger.leave(&id(), UserId(user));
                    }
                }

                if let Some(muster) = ledger.get(&id()) {
                    prop_assert!(muster.members.len() < muster.capacity);
                    let mut sorted = muster.members.clone();
                    sorted.sort();
                    sorted.dedup();
                    prop_assert_eq!(sorted.len(), muster.members.len());
                }
            }

            prop_assert!(completions <= 1);
        }
    }
}
