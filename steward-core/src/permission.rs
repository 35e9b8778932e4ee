//! Role-based permission resolution.
//!
//! Every privileged action goes through [`resolve`]. The resolver is a pure
//! function over data the caller has already fetched (the actor's roles, the
//! guild's role grants, the owner allow-list), so it is deterministic and can
//! be called from any number of interactions at once.
//!
//! Resolution order:
//! 1. Owners are allowed everything.
//! 2. Owner-only actions are denied to everyone else.
//! 3. Public actions are allowed to everyone, including actors with no roles.
//! 4. Otherwise the action is allowed iff one of the actor's roles carries a
//!    grant for it, or the actor holds the guild's legacy approver role.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::ids::{RoleId, UserId};

/// A privileged (or public) operation an actor can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "help")]
    Help,
    #[serde(rename = "sync")]
    Sync,
    #[serde(rename = "manageroles")]
    ManageRoles,
    #[serde(rename = "addform")]
    AddForm,
    #[serde(rename = "approvchannel")]
    ApprovalChannel,
    #[serde(rename = "giveapprov")]
    GiveApprover,
    #[serde(rename = "createcapt")]
    CreateMuster,
    #[serde(rename = "blacklistchannel")]
    BlacklistChannel,
    #[serde(rename = "blacklist")]
    Blacklist,
    #[serde(rename = "unblacklist")]
    Unblacklist,
    /// Approving or denying a submitted application.
    #[serde(rename = "review")]
    Review,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Help,
        Action::Sync,
        Action::ManageRoles,
        Action::AddForm,
        Action::ApprovalChannel,
        Action::GiveApprover,
        Action::CreateMuster,
        Action::BlacklistChannel,
        Action::Blacklist,
        Action::Unblacklist,
        Action::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Help => "help",
            Action::Sync => "sync",
            Action::ManageRoles => "manageroles",
            Action::AddForm => "addform",
            Action::ApprovalChannel => "approvchannel",
            Action::GiveApprover => "giveapprov",
            Action::CreateMuster => "createcapt",
            Action::BlacklistChannel => "blacklistchannel",
            Action::Blacklist => "blacklist",
            Action::Unblacklist => "unblacklist",
            Action::Review => "review",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::Help => "Show the commands you can use",
            Action::Sync => "Re-register the command catalog with the platform",
            Action::ManageRoles => "Grant or reset role permissions",
            Action::AddForm => "Post an application form",
            Action::ApprovalChannel => "Set or clear the application review channel",
            Action::GiveApprover => "Set the approver and approved roles",
            Action::CreateMuster => "Create a capacity-limited muster",
            Action::BlacklistChannel => "Set the blacklist report channel",
            Action::Blacklist => "Add a user to the blacklist",
            Action::Unblacklist => "Remove a user from the blacklist",
            Action::Review => "Approve or deny applications",
        }
    }

    /// Actions reserved for owners; role grants never unlock them.
    pub fn is_owner_only(&self) -> bool {
        matches!(self, Action::Sync | Action::ManageRoles)
    }

    /// Actions every actor may perform.
    pub fn is_public(&self) -> bool {
        matches!(self, Action::Help)
    }

    /// Whether the action can meaningfully appear in a role grant.
    pub fn is_grantable(&self) -> bool {
        !self.is_owner_only() && !self.is_public()
    }

    pub fn grantable() -> impl Iterator<Item = Action> {
        Self::ALL.into_iter().filter(Action::is_grantable)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or(ValidationError::UnknownAction { name })
    }
}

/// Parse a comma or whitespace separated list of grantable action names.
///
/// An empty list is valid and means "no grants".
pub fn parse_grant_list(text: &str) -> Result<BTreeSet<Action>, ValidationError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            let action: Action = token.parse()?;
            if action.is_grantable() {
                Ok(action)
            } else {
                Err(ValidationError::NotGrantable {
                    name: action.as_str().to_string(),
                })
            }
        })
        .collect()
}

/// Process-wide allow-list of identities with unconditional permission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSet {
    ids: BTreeSet<UserId>,
}

impl OwnerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.ids.contains(&user)
    }

    /// Returns true if the owner was newly added.
    pub fn insert(&mut self, user: UserId) -> bool {
        self.ids.insert(user)
    }

    /// Returns true if the owner was present.
    pub fn remove(&mut self, user: UserId) -> bool {
        self.ids.remove(&user)
    }

    pub fn iter(&self) -> impl Iterator<Item = UserId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<UserId> for OwnerSet {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Role grants configured for one guild, plus its legacy approver role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildGrants {
    roles: HashMap<RoleId, BTreeSet<Action>>,
    approver_role: Option<RoleId>,
}

impl GuildGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_approver_role(mut self, role: Option<RoleId>) -> Self {
        self.approver_role = role;
        self
    }

    /// Overwrite the grant set for a role.
    pub fn set_role(&mut self, role: RoleId, actions: BTreeSet<Action>) {
        if actions.is_empty() {
            self.roles.remove(&role);
        } else {
            self.roles.insert(role, actions);
        }
    }

    pub fn reset_role(&mut self, role: RoleId) {
        self.roles.remove(&role);
    }

    pub fn actions_for(&self, role: RoleId) -> Option<&BTreeSet<Action>> {
        self.roles.get(&role)
    }

    pub fn approver_role(&self) -> Option<RoleId> {
        self.approver_role
    }

    fn role_allows(&self, role: RoleId, action: Action) -> bool {
        self.roles
            .get(&role)
            .is_some_and(|actions| actions.contains(&action))
    }
}

/// Decide whether `actor` may perform `action`.
pub fn resolve(
    actor: UserId,
    actor_roles: &[RoleId],
    action: Action,
    grants: &GuildGrants,
    owners: &OwnerSet,
) -> bool {
    if owners.contains(actor) {
        return true;
    }
    if action.is_owner_only() {
        return false;
    }
    if action.is_public() {
        return true;
    }

    // The legacy approver role stays a second, independent path to access.
    actor_roles
        .iter()
        .any(|role| grants.role_allows(*role, action))
        || grants
            .approver_role
            .is_some_and(|approver| actor_roles.contains(&approver))
}

/// Every action `actor` may perform, in catalog order.
pub fn permitted_actions(
    actor: UserId,
    actor_roles: &[RoleId],
    grants: &GuildGrants,
    owners: &OwnerSet,
) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|action| resolve(actor, actor_roles, *action, grants, owners))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: UserId = UserId(1);
    const MEMBER: UserId = UserId(2);
    const MOD_ROLE: RoleId = RoleId(100);
    const APPROVER_ROLE: RoleId = RoleId(200);

    fn owners() -> OwnerSet {
        [OWNER].into_iter().collect()
    }

    #[test]
    fn test_owner_is_granted_everything() {
        let grants = GuildGrants::new();
        for action in Action::ALL {
            assert!(
                resolve(OWNER, &[], action, &grants, &owners()),
                "owner should be allowed {}",
                action
            );
        }
    }

    #[test]
    fn test_owner_only_actions_ignore_role_grants() {
        let mut grants = GuildGrants::new().with_approver_role(Some(APPROVER_ROLE));
        grants.set_role(MOD_ROLE, Action::ALL.into_iter().collect());

        assert!(!resolve(
            MEMBER,
            &[MOD_ROLE, APPROVER_ROLE],
            Action::Sync,
            &grants,
            &owners()
        ));
        assert!(!resolve(
            MEMBER,
            &[MOD_ROLE, APPROVER_ROLE],
            Action::ManageRoles,
            &grants,
            &owners()
        ));
    }

    #[test]
    fn test_public_action_allowed_without_roles() {
        assert!(resolve(
            MEMBER,
            &[],
            Action::Help,
            &GuildGrants::new(),
            &OwnerSet::new()
        ));
    }

    #[test]
    fn test_no_grants_denies_every_gated_action() {
        let grants = GuildGrants::new();
        for action in Action::grantable() {
            assert!(!resolve(MEMBER, &[MOD_ROLE], action, &grants, &owners()));
        }
    }

    #[test]
    fn test_role_grant_allows_only_granted_action() {
        let mut grants = GuildGrants::new();
        grants.set_role(MOD_ROLE, [Action::Blacklist].into_iter().collect());

        assert!(resolve(
            MEMBER,
            &[MOD_ROLE],
            Action::Blacklist,
            &grants,
            &owners()
        ));
        assert!(!resolve(
            MEMBER,
            &[MOD_ROLE],
            Action::Unblacklist,
            &grants,
            &owners()
        ));
        assert!(!resolve(MEMBER, &[], Action::Blacklist, &grants, &owners()));
    }

    #[test]
    fn test_reset_revokes_grant() {
        let mut grants = GuildGrants::new();
        grants.set_role(MOD_ROLE, [Action::Blacklist].into_iter().collect());
        assert!(resolve(
            MEMBER,
            &[MOD_ROLE],
            Action::Blacklist,
            &grants,
            &owners()
        ));

        grants.reset_role(MOD_ROLE);
        assert!(!resolve(
            MEMBER,
            &[MOD_ROLE],
            Action::Blacklist,
            &grants,
            &owners()
        ));
    }

    #[test]
    fn test_legacy_approver_role_allows_gated_actions() {
        let grants = GuildGrants::new().with_approver_role(Some(APPROVER_ROLE));

        assert!(resolve(
            MEMBER,
            &[APPROVER_ROLE],
            Action::Review,
            &grants,
            &owners()
        ));
        assert!(resolve(
            MEMBER,
            &[APPROVER_ROLE],
            Action::CreateMuster,
            &grants,
            &owners()
        ));
        assert!(!resolve(
            MEMBER,
            &[APPROVER_ROLE],
            Action::Sync,
            &grants,
            &owners()
        ));
    }

    #[test]
    fn test_action_names_round_trip_through_from_str() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!("/Blacklist".parse::<Action>().unwrap(), Action::Blacklist);
        assert!(matches!(
            "frobnicate".parse::<Action>(),
            Err(ValidationError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_parse_grant_list() {
        let actions = parse_grant_list("blacklist, unblacklist createcapt").unwrap();
        assert_eq!(
            actions.into_iter().collect::<Vec<_>>(),
            vec![Action::CreateMuster, Action::Blacklist, Action::Unblacklist]
        );
        assert!(parse_grant_list("").unwrap().is_empty());
        assert_eq!(
            parse_grant_list("sync"),
            Err(ValidationError::NotGrantable {
                name: "sync".to_string()
            })
        );
    }

    #[test]
    fn test_permitted_actions_for_plain_member() {
        let actions = permitted_actions(MEMBER, &[], &GuildGrants::new(), &owners());
        assert_eq!(actions, vec![Action::Help]);
    }

    #[test]
    fn test_action_serde_uses_command_names() {
        let json = serde_json::to_string(&Action::CreateMuster).unwrap();
        assert_eq!(json, "\"createcapt\"");
    }
}
