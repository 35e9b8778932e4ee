//! Workflow orchestration.
//!
//! Every interaction runs in the same order:
//!
//! 1. resolve permission (denial short-circuits),
//! 2. take the review lock where the workflow needs one,
//! 3. mutate the in-memory table, persist, then notify,
//! 4. release the lock or finalize the muster.
//!
//! Platform calls and store writes only ever happen after the in-memory
//! decision has been made; see [`crate::coordination`].

mod admin;
mod muster;
mod review;

pub use admin::{FormPost, Status};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use steward_core::{
    resolve, Action, GuildId, JoinRejection, LeaveRejection, OwnerSet, RoleId, UserId,
    ValidationError,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::command::CommandError;
use crate::coordination::Coordinator;
use crate::platform::{Embed, Modal, OutgoingMessage, Platform, PlatformError};
use crate::records::Records;
use crate::store::{DocumentStore, StoreError};

/// Time-related settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long a review lock may sit idle before the sweep reclaims it.
    pub review_idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Pause between showing a completed muster's roster and deleting it.
    pub muster_cleanup_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            review_idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            muster_cleanup_delay: Duration::from_secs(5),
        }
    }
}

/// The user behind an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub guild: GuildId,
    pub user: UserId,
    /// Roles delivered with the interaction. When absent they are fetched
    /// from the platform on demand.
    roles: Option<Vec<RoleId>>,
}

impl Actor {
    pub fn new(guild: GuildId, user: UserId) -> Self {
        Self {
            guild,
            user,
            roles: None,
        }
    }

    pub fn with_roles(guild: GuildId, user: UserId, roles: Vec<RoleId>) -> Self {
        Self {
            guild,
            user,
            roles: Some(roles),
        }
    }
}

/// What the actor sees in response to an interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A message only the actor can see.
    Message(OutgoingMessage),
    Modal(Modal),
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply::Message(OutgoingMessage::text(content))
    }

    pub fn embed(embed: Embed) -> Self {
        Reply::Message(OutgoingMessage::embed(embed))
    }

    /// A confirmation followed by any best-effort steps that failed.
    fn with_warnings(content: impl Into<String>, warnings: Vec<String>) -> Self {
        let mut content = content.into();
        for warning in warnings {
            content.push_str("\n⚠️ ");
            content.push_str(&warning);
        }
        Reply::text(content)
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Reply::Message(message) => message.content.as_deref(),
            Reply::Modal(_) => None,
        }
    }
}

/// Everything that can stop an interaction, rendered for the actor.
///
/// Collaborator failures only show a generic text; the detail is kept for
/// logs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("⛔ You need the `{action}` permission to do that.")]
    PermissionDenied { action: Action },

    #[error("🔒 This application is currently being reviewed by {}.", holder.mention())]
    UnderReview { holder: UserId },

    #[error("{}", join_message(.0))]
    Join(#[from] JoinRejection),

    #[error("{}", leave_message(.0))]
    Leave(#[from] LeaveRejection),

    #[error("{what} no longer exists.")]
    NotFound { what: &'static str },

    #[error("❌ {0}")]
    Validation(#[from] ValidationError),

    #[error("❌ {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("⚙️ {what} is not configured. Ask an administrator to set it up.")]
    NotConfigured { what: &'static str },

    #[error("Something went wrong while talking to the {service}. Please try again later.")]
    Collaborator {
        service: &'static str,
        detail: String,
    },
}

fn join_message(rejection: &JoinRejection) -> String {
    match rejection {
        JoinRejection::Full { capacity } => format!("⚠️ The muster is full ({} members).", capacity),
        JoinRejection::AlreadyMember => "ℹ️ You are already in this muster.".to_string(),
        JoinRejection::NotFound => "This muster no longer exists.".to_string(),
    }
}

fn leave_message(rejection: &LeaveRejection) -> String {
    match rejection {
        LeaveRejection::NotMember => "ℹ️ You are not in this muster.".to_string(),
        LeaveRejection::NotFound => "This muster no longer exists.".to_string(),
    }
}

impl WorkflowError {
    /// Failures of an outside system, as opposed to expected refusals.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, WorkflowError::Collaborator { .. })
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        WorkflowError::Collaborator {
            service: "database",
            detail: err.to_string(),
        }
    }
}

impl From<PlatformError> for WorkflowError {
    fn from(err: PlatformError) -> Self {
        WorkflowError::Collaborator {
            service: "chat platform",
            detail: err.to_string(),
        }
    }
}

impl From<CommandError> for WorkflowError {
    fn from(err: CommandError) -> Self {
        WorkflowError::InvalidInput(err.to_string())
    }
}

/// Record a failed best-effort step.
fn note_failure<T>(warnings: &mut Vec<String>, step: &str, result: Result<T, PlatformError>) {
    if let Err(e) = result {
        warn!("Could not {}: {}", step, e);
        warnings.push(format!("Could not {}.", step));
    }
}

/// Ties the coordination tables to the platform and the store.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    coordinator: Arc<Coordinator>,
    platform: Arc<dyn Platform>,
    records: Records,
    clock: Arc<dyn Clock>,
    owners: Arc<RwLock<OwnerSet>>,
    timing: Timing,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        timing: Timing,
    ) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new()),
            platform,
            records: Records::new(store),
            clock,
            owners: Arc::new(RwLock::new(OwnerSet::new())),
            timing,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =========================================================================
    // Owners
    // =========================================================================

    /// Load the persisted owner set and merge in `configured` owners.
    pub async fn load_owners(
        &self,
        configured: impl IntoIterator<Item = UserId>,
    ) -> Result<usize, StoreError> {
        let mut owners = self.records.owners().await?;
        let mut changed = false;
        for owner in configured {
            changed |= owners.insert(owner);
        }
        if changed {
            self.records.save_owners(&owners).await?;
        }
        let count = owners.len();
        *self.owners.write().await = owners;
        info!("Loaded {} owners", count);
        Ok(count)
    }

    pub async fn owners(&self) -> OwnerSet {
        self.owners.read().await.clone()
    }

    /// Returns whether the owner was newly added.
    pub async fn add_owner(&self, user: UserId) -> Result<bool, StoreError> {
        let snapshot = {
            let mut owners = self.owners.write().await;
            if !owners.insert(user) {
                return Ok(false);
            }
            owners.clone()
        };
        self.records.save_owners(&snapshot).await?;
        info!("Added owner {}", user);
        Ok(true)
    }

    /// Returns whether the owner was present.
    pub async fn remove_owner(&self, user: UserId) -> Result<bool, StoreError> {
        let snapshot = {
            let mut owners = self.owners.write().await;
            if !owners.remove(user) {
                return Ok(false);
            }
            owners.clone()
        };
        self.records.save_owners(&snapshot).await?;
        info!("Removed owner {}", user);
        Ok(true)
    }

    // =========================================================================
    // Permission gate
    // =========================================================================

    async fn actor_roles(&self, actor: &Actor) -> Result<Vec<RoleId>, WorkflowError> {
        match &actor.roles {
            Some(roles) => Ok(roles.clone()),
            None => Ok(self.platform.member_roles(actor.guild, actor.user).await?),
        }
    }

    /// Deny unless `actor` may perform `action`.
    async fn authorize(&self, actor: &Actor, action: Action) -> Result<(), WorkflowError> {
        let owners = self.owners().await;
        if owners.contains(actor.user) {
            return Ok(());
        }

        let roles = self.actor_roles(actor).await?;
        let grants = self.records.grants(actor.guild).await?;
        if resolve(actor.user, &roles, action, &grants, &owners) {
            Ok(())
        } else {
            debug!("Denied {} to {} in guild {}", action, actor.user, actor.guild);
            Err(WorkflowError::PermissionDenied { action })
        }
    }

    /// Every action `actor` may perform, in catalog order.
    pub async fn permitted_actions(&self, actor: &Actor) -> Result<Vec<Action>, WorkflowError> {
        let owners = self.owners().await;
        let roles = if owners.contains(actor.user) {
            Vec::new()
        } else {
            self.actor_roles(actor).await?
        };
        let grants = self.records.grants(actor.guild).await?;
        Ok(steward_core::permitted_actions(
            actor.user, &roles, &grants, &owners,
        ))
    }
}
