use thiserror::Error;

use crate::muster::{MAX_CAPACITY, MAX_TIMER_MINUTES, MIN_CAPACITY, MIN_TIMER_MINUTES};

/// Input rejected before any state is created or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "capacity must be between {} and {} (got {capacity})",
        MIN_CAPACITY,
        MAX_CAPACITY
    )]
    CapacityOutOfRange { capacity: i64 },

    #[error(
        "timer must be between {} and {} minutes (got {minutes})",
        MIN_TIMER_MINUTES,
        MAX_TIMER_MINUTES
    )]
    TimerOutOfRange { minutes: i64 },

    #[error("unknown action `{name}`")]
    UnknownAction { name: String },

    #[error("`{name}` cannot be granted to a role")]
    NotGrantable { name: String },
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinRejection {
    #[error("muster is full ({capacity} members)")]
    Full { capacity: usize },

    #[error("already a member of this muster")]
    AlreadyMember,

    #[error("muster no longer exists")]
    NotFound,
}

/// Why a leave was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LeaveRejection {
    #[error("not a member of this muster")]
    NotMember,

    #[error("muster no longer exists")]
    NotFound,
}
