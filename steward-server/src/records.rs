//! Typed records over the document store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use steward_core::{
    Action, Application, ChannelId, GuildGrants, GuildId, MessageId, Muster, MusterId, OwnerSet,
    RoleId, UserId,
};
use tracing::warn;

use crate::store::{collections, DocumentStore, Keyed, StoreError};

const OWNERS_KEY: &str = "owners";

/// Per-guild configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    #[serde(default)]
    pub form_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub review_channel_id: Option<ChannelId>,
    /// Legacy single role allowed to perform every gated action.
    #[serde(default)]
    pub approver_role_id: Option<RoleId>,
    /// Role granted to applicants on approval.
    #[serde(default)]
    pub approved_role_id: Option<RoleId>,
    #[serde(default)]
    pub blacklist_channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrantRecord {
    pub guild_id: GuildId,
    pub role_id: RoleId,
    pub actions: BTreeSet<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// In-game identifier of the blacklisted player.
    pub static_id: String,
    pub reason: String,
    pub reporter_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn key(&self) -> String {
        blacklist_key(self.guild_id, self.user_id)
    }
}

fn blacklist_key(guild: GuildId, user: UserId) -> String {
    format!("{}_{}", guild, user)
}

fn grant_key(guild: GuildId, role: RoleId) -> String {
    format!("{}_{}", guild, role)
}

fn application_key(guild: GuildId, message: MessageId) -> String {
    format!("{}_{}", guild, message)
}

fn id_value(id: impl ToString) -> Value {
    Value::String(id.to_string())
}

fn decode<T: DeserializeOwned>(collection: &str, key: &str, document: Value) -> Result<T, StoreError> {
    serde_json::from_value(document).map_err(|e| StoreError::corruption(collection, key, e))
}

/// Decode every document, skipping (and logging) ones that no longer parse.
fn decode_all<T: DeserializeOwned>(collection: &str, documents: Vec<Keyed>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|(key, document)| match decode(collection, &key, document) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping undecodable record: {}", e);
                None
            }
        })
        .collect()
}

fn encode<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::storage("serialize record", e.to_string()))
}

/// Typed access to every collection the bot persists.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn DocumentStore>,
}

impl Records {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    // =========================================================================
    // Guild settings
    // =========================================================================

    pub async fn settings(&self, guild: GuildId) -> Result<GuildSettings, StoreError> {
        let key = guild.to_string();
        match self.store.get(collections::GUILD_SETTINGS, &key).await? {
            Some(document) => decode(collections::GUILD_SETTINGS, &key, document),
            None => Ok(GuildSettings::default()),
        }
    }

    pub async fn save_settings(
        &self,
        guild: GuildId,
        settings: &GuildSettings,
    ) -> Result<(), StoreError> {
        self.store
            .set(
                collections::GUILD_SETTINGS,
                &guild.to_string(),
                encode(settings)?,
            )
            .await
    }

    // =========================================================================
    // Role grants
    // =========================================================================

    /// Role grants for a guild, including its legacy approver role.
    pub async fn grants(&self, guild: GuildId) -> Result<GuildGrants, StoreError> {
        let settings = self.settings(guild).await?;
        let records: Vec<RoleGrantRecord> = decode_all(
            collections::ROLE_PERMISSIONS,
            self.store
                .query(collections::ROLE_PERMISSIONS, "guild_id", &id_value(guild))
                .await?,
        );

        let mut grants = GuildGrants::new().with_approver_role(settings.approver_role_id);
        for record in records {
            grants.set_role(record.role_id, record.actions);
        }
        Ok(grants)
    }

    pub async fn role_grant(
        &self,
        guild: GuildId,
        role: RoleId,
    ) -> Result<BTreeSet<Action>, StoreError> {
        let key = grant_key(guild, role);
        match self.store.get(collections::ROLE_PERMISSIONS, &key).await? {
            Some(document) => {
                let record: RoleGrantRecord =
                    decode(collections::ROLE_PERMISSIONS, &key, document)?;
                Ok(record.actions)
            }
            None => Ok(BTreeSet::new()),
        }
    }

    /// Overwrite a role's grant set. An empty set removes the record.
    pub async fn set_role_grant(
        &self,
        guild: GuildId,
        role: RoleId,
        actions: BTreeSet<Action>,
    ) -> Result<(), StoreError> {
        let key = grant_key(guild, role);
        if actions.is_empty() {
            self.store.delete(collections::ROLE_PERMISSIONS, &key).await?;
            return Ok(());
        }
        let record = RoleGrantRecord {
            guild_id: guild,
            role_id: role,
            actions,
        };
        self.store
            .set(collections::ROLE_PERMISSIONS, &key, encode(&record)?)
            .await
    }

    // =========================================================================
    // Owners
    // =========================================================================

    pub async fn owners(&self) -> Result<OwnerSet, StoreError> {
        match self.store.get(collections::OWNERS, OWNERS_KEY).await? {
            Some(document) => decode(collections::OWNERS, OWNERS_KEY, document),
            None => Ok(OwnerSet::new()),
        }
    }

    pub async fn save_owners(&self, owners: &OwnerSet) -> Result<(), StoreError> {
        self.store
            .set(collections::OWNERS, OWNERS_KEY, encode(owners)?)
            .await
    }

    // =========================================================================
    // Applications
    // =========================================================================

    pub async fn application(
        &self,
        guild: GuildId,
        message: MessageId,
    ) -> Result<Option<Application>, StoreError> {
        let key = application_key(guild, message);
        self.store
            .get(collections::APPLICATIONS, &key)
            .await?
            .map(|document| decode(collections::APPLICATIONS, &key, document))
            .transpose()
    }

    /// All applications, or those of one guild.
    pub async fn applications(&self, guild: Option<GuildId>) -> Result<Vec<Application>, StoreError> {
        let documents = match guild {
            Some(guild) => {
                self.store
                    .query(collections::APPLICATIONS, "guild_id", &id_value(guild))
                    .await?
            }
            None => self.store.list(collections::APPLICATIONS).await?,
        };
        Ok(decode_all(collections::APPLICATIONS, documents))
    }

    /// An application by `applicant` in `guild` that has not been decided yet.
    pub async fn open_application_for(
        &self,
        guild: GuildId,
        applicant: UserId,
    ) -> Result<Option<Application>, StoreError> {
        let documents = self
            .store
            .query(collections::APPLICATIONS, "applicant_id", &id_value(applicant))
            .await?;
        Ok(decode_all::<Application>(collections::APPLICATIONS, documents)
            .into_iter()
            .find(|application| application.guild_id == guild && !application.status.is_terminal()))
    }

    pub async fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        self.store
            .set(
                collections::APPLICATIONS,
                &application.key(),
                encode(application)?,
            )
            .await
    }

    pub async fn delete_application(
        &self,
        guild: GuildId,
        message: MessageId,
    ) -> Result<bool, StoreError> {
        self.store
            .delete(collections::APPLICATIONS, &application_key(guild, message))
            .await
    }

    /// Delete the application carried by `message`, whichever guild it is in.
    pub async fn delete_application_by_message(&self, message: MessageId) -> Result<usize, StoreError> {
        let documents = self
            .store
            .query(collections::APPLICATIONS, "message_id", &id_value(message))
            .await?;
        let mut removed = 0;
        for (key, _) in documents {
            if self.store.delete(collections::APPLICATIONS, &key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // =========================================================================
    // Musters
    // =========================================================================

    pub async fn musters(&self) -> Result<Vec<Muster>, StoreError> {
        Ok(decode_all(
            collections::MUSTERS,
            self.store.list(collections::MUSTERS).await?,
        ))
    }

    pub async fn save_muster(&self, muster: &Muster) -> Result<(), StoreError> {
        self.store
            .set(collections::MUSTERS, &muster.id.key(), encode(muster)?)
            .await
    }

    pub async fn delete_muster(&self, id: &MusterId) -> Result<bool, StoreError> {
        self.store.delete(collections::MUSTERS, &id.key()).await
    }

    // =========================================================================
    // Blacklist
    // =========================================================================

    pub async fn blacklist_entry(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> Result<Option<BlacklistEntry>, StoreError> {
        let key = blacklist_key(guild, user);
        self.store
            .get(collections::BLACKLIST, &key)
            .await?
            .map(|document| decode(collections::BLACKLIST, &key, document))
            .transpose()
    }

    pub async fn blacklist(&self, guild: GuildId) -> Result<Vec<BlacklistEntry>, StoreError> {
        Ok(decode_all(
            collections::BLACKLIST,
            self.store
                .query(collections::BLACKLIST, "guild_id", &id_value(guild))
                .await?,
        ))
    }

    pub async fn save_blacklist_entry(&self, entry: &BlacklistEntry) -> Result<(), StoreError> {
        self.store
            .set(collections::BLACKLIST, &entry.key(), encode(entry)?)
            .await
    }

    pub async fn delete_blacklist_entry(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> Result<bool, StoreError> {
        self.store
            .delete(collections::BLACKLIST, &blacklist_key(guild, user))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use chrono::TimeZone;
    use steward_core::{ApplicationAnswers, ApplicationStatus};

    fn records() -> Records {
        Records::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_grants_combine_role_records_and_approver_role() {
        let records = records();
        let guild = GuildId(1);
        records
            .save_settings(
                guild,
                &GuildSettings {
                    approver_role_id: Some(RoleId(9)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        records
            .set_role_grant(guild, RoleId(5), [Action::Blacklist].into_iter().collect())
            .await
            .unwrap();
        records
            .set_role_grant(GuildId(2), RoleId(6), [Action::Unblacklist].into_iter().collect())
            .await
            .unwrap();

        let grants = records.grants(guild).await.unwrap();
        assert_eq!(grants.approver_role(), Some(RoleId(9)));
        assert!(grants.actions_for(RoleId(5)).unwrap().contains(&Action::Blacklist));
        assert!(grants.actions_for(RoleId(6)).is_none());
    }

    #[tokio::test]
    async fn test_empty_grant_deletes_record() {
        let records = records();
        records
            .set_role_grant(GuildId(1), RoleId(5), [Action::Review].into_iter().collect())
            .await
            .unwrap();
        records
            .set_role_grant(GuildId(1), RoleId(5), BTreeSet::new())
            .await
            .unwrap();

        assert!(records.role_grant(GuildId(1), RoleId(5)).await.unwrap().is_empty());
        assert!(records.grants(GuildId(1)).await.unwrap().actions_for(RoleId(5)).is_none());
    }

    #[tokio::test]
    async fn test_open_application_lookup_ignores_other_guilds() {
        let records = records();
        let application = Application::new(
            MessageId(50),
            GuildId(1),
            ChannelId(2),
            UserId(3),
            ApplicationAnswers::default(),
            at(),
        );
        records.save_application(&application).await.unwrap();

        assert!(records
            .open_application_for(GuildId(1), UserId(3))
            .await
            .unwrap()
            .is_some());
        assert!(records
            .open_application_for(GuildId(2), UserId(3))
            .await
            .unwrap()
            .is_none());

        let mut decided = application.clone();
        decided.status = ApplicationStatus::Approved;
        records.save_application(&decided).await.unwrap();
        assert!(records
            .open_application_for(GuildId(1), UserId(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_application_by_message() {
        let records = records();
        let application = Application::new(
            MessageId(50),
            GuildId(1),
            ChannelId(2),
            UserId(3),
            ApplicationAnswers::default(),
            at(),
        );
        records.save_application(&application).await.unwrap();

        assert_eq!(records.delete_application_by_message(MessageId(50)).await.unwrap(), 1);
        assert!(records.application(GuildId(1), MessageId(50)).await.unwrap().is_none());
        assert_eq!(records.delete_application_by_message(MessageId(50)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_owners_default_to_empty() {
        let records = records();
        assert!(records.owners().await.unwrap().is_empty());

        let owners: OwnerSet = [UserId(1), UserId(2)].into_iter().collect();
        records.save_owners(&owners).await.unwrap();
        assert_eq!(records.owners().await.unwrap(), owners);
    }

    #[tokio::test]
    async fn test_blacklist_listing_is_per_guild() {
        let records = records();
        for (guild, user) in [(1, 10), (1, 11), (2, 12)] {
            records
                .save_blacklist_entry(&BlacklistEntry {
                    guild_id: GuildId(guild),
                    user_id: UserId(user),
                    static_id: "77".into(),
                    reason: "griefing".into(),
                    reporter_id: UserId(1),
                    created_at: at(),
                })
                .await
                .unwrap();
        }

        assert_eq!(records.blacklist(GuildId(1)).await.unwrap().len(), 2);
        assert!(records.delete_blacklist_entry(GuildId(1), UserId(10)).await.unwrap());
        assert_eq!(records.blacklist(GuildId(1)).await.unwrap().len(), 1);
    }
}
