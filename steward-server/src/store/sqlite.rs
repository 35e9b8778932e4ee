//! SQLite implementation of `DocumentStore`.
//!
//! Documents live in a single `documents` table keyed by
//! `(collection, key)`. Field queries use SQLite's `json_extract`.
//!
//! # Schema Versioning
//!
//! The `schema_version` table holds a single row. Bump
//! `CURRENT_SCHEMA_VERSION` and add a step to `run_migrations()` when the
//! schema changes.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::warn;

use super::{DocumentStore, Keyed, StoreError};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed document store.
///
/// rusqlite is synchronous, so every call runs on the blocking pool via
/// `tokio::task::spawn_blocking`.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path`.
    ///
    /// The database runs with `journal_mode = WAL`, `synchronous = FULL` and a
    /// 5 second busy timeout.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| StoreError::storage("open database", e.to_string()))?;

        #[cfg(unix)]
        if !is_in_memory {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // In-memory databases report "memory" and have nothing to make durable.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(StoreError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal'; the state directory must \
                     be on a filesystem that supports shared memory",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::storage("configure database", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::storage(
                "check schema version",
                format!(
                    "database schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    key TEXT NOT NULL,
                    body TEXT NOT NULL,
                    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                    PRIMARY KEY (collection, key)
                );
                "#,
            )
            .map_err(|e| StoreError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard: MutexGuard<'_, Connection> = conn
                .lock()
                .map_err(|_| StoreError::storage(operation, "connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::storage(operation, e.to_string()))?
    }
}

fn decode_rows(collection: &str, rows: Vec<(String, String)>) -> Result<Vec<Keyed>, StoreError> {
    rows.into_iter()
        .map(|(key, body)| {
            serde_json::from_str(&body)
                .map(|document| (key.clone(), document))
                .map_err(|e| StoreError::corruption(collection, &key, e))
        })
        .collect()
}

/// The SQL value `json_extract` yields for a JSON scalar.
fn sql_scalar(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();

        self.with_conn("get", move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::storage("get", e.to_string()))?;

            body.map(|body| {
                serde_json::from_str(&body).map_err(|e| StoreError::corruption(&collection, &key, e))
            })
            .transpose()
        })
        .await
    }

    async fn set(&self, collection: &str, key: &str, document: Value) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let body = serde_json::to_string(&document)
            .map_err(|e| StoreError::storage("serialize document", e.to_string()))?;

        self.with_conn("set", move |conn| {
            conn.execute(
                "INSERT INTO documents (collection, key, body, updated_at)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))
                 ON CONFLICT(collection, key) DO UPDATE SET
                     body = excluded.body,
                     updated_at = excluded.updated_at",
                params![collection, key, body],
            )
            .map_err(|e| StoreError::storage("set", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let collection = collection.to_string();
        let key = key.to_string();

        self.with_conn("delete", move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )
                .map_err(|e| StoreError::storage("delete", e.to_string()))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Keyed>, StoreError> {
        let collection = collection.to_string();
        let path = format!("$.{}", field);
        let expected = sql_scalar(value);

        self.with_conn("query", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key, body FROM documents
                     WHERE collection = ?1 AND json_extract(body, ?2) = ?3
                     ORDER BY key",
                )
                .map_err(|e| StoreError::storage("query", e.to_string()))?;

            let rows = stmt
                .query_map(params![collection, path, expected], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| StoreError::storage("query", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::storage("query", e.to_string()))?;

            decode_rows(&collection, rows)
        })
        .await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Keyed>, StoreError> {
        let collection = collection.to_string();

        self.with_conn("list", move |conn| {
            let mut stmt = conn
                .prepare("SELECT key, body FROM documents WHERE collection = ?1 ORDER BY key")
                .map_err(|e| StoreError::storage("list", e.to_string()))?;

            let rows = stmt
                .query_map(params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| StoreError::storage("list", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::storage("list", e.to_string()))?;

            decode_rows(&collection, rows)
        })
        .await
    }
}
