//! Keyed JSON document storage.
//!
//! The bot persists everything as JSON documents grouped into named
//! collections. The in-memory tables in [`crate::coordination`] are the
//! authority while the process runs; the store is the durable mirror that is
//! written after every accepted mutation and reloaded on startup.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Collection names.
pub mod collections {
    pub const APPLICATIONS: &str = "applications";
    pub const MUSTERS: &str = "musters";
    pub const ROLE_PERMISSIONS: &str = "role_permissions";
    pub const GUILD_SETTINGS: &str = "guild_settings";
    pub const BLACKLIST: &str = "blacklist";
    pub const OWNERS: &str = "owners";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("document {collection}/{key} could not be decoded: {message}")]
    Corruption {
        collection: String,
        key: String,
        message: String,
    },
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(collection: &str, key: &str, message: impl ToString) -> Self {
        StoreError::Corruption {
            collection: collection.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// A document together with its key.
pub type Keyed = (String, Value);

/// Storage backend for JSON documents.
///
/// Writes are last-write-wins upserts. `field` arguments of [`query`] are
/// dotted paths into the document (`"guild_id"`, `"id.guild_id"`).
///
/// [`query`]: DocumentStore::query
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Every document in `collection` whose `field` equals `value`, ordered by key.
    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Keyed>, StoreError>;

    /// Every document in `collection`, ordered by key.
    async fn list(&self, collection: &str) -> Result<Vec<Keyed>, StoreError>;
}

/// Follow a dotted path into a document.
pub(crate) fn lookup<'a>(document: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(document, |current, segment| current.get(segment))
}
