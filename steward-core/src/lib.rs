pub mod application;
pub mod error;
pub mod ids;
pub mod muster;
pub mod permission;
pub mod review_lock;

pub use application::{Application, ApplicationAnswers, ApplicationStatus, Decision};
pub use error::{JoinRejection, LeaveRejection, ValidationError};
pub use ids::{ChannelId, GuildId, MessageId, MusterId, RoleId, UserId};
pub use muster::{JoinOutcome, Muster, MusterLedger, MusterSpec};
pub use permission::{parse_grant_list, permitted_actions, resolve, Action, GuildGrants, OwnerSet};
pub use review_lock::{Acquire, ReviewLock, ReviewLockTable};
