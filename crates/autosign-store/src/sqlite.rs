use async_trait::async_trait;
use autosign_identity::KeyValueStore;
use autosign_types::AutosignError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tracing::debug;

/// Key/value storage for delegated keys backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    /// Open or create the database. `":memory:"` gives a private in-memory
    /// database that lives as long as the store.
    pub async fn open(db_path: &str) -> Result<Self, AutosignError> {
        // Every in-memory connection is its own database.
        let max_connections = if db_path == ":memory:" { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&format!("sqlite:{db_path}?mode=rwc"))
            .await
            .map_err(|e| AutosignError::Storage(e.to_string()))?;

        let store = Self {
            pool: Arc::new(pool),
        };
        store.migrate().await?;
        debug!(db_path, "key store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), AutosignError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| AutosignError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Stored keys starting with `prefix`, e.g. one instance's namespace.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, AutosignError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| AutosignError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    pub async fn count(&self) -> Result<i64, AutosignError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| AutosignError::Storage(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), AutosignError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| AutosignError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, AutosignError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(|e| AutosignError::Storage(e.to_string()))?;
        Ok(row.map(|(value,)| value))
    }

    async fn remove(&self, key: &str) -> Result<(), AutosignError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| AutosignError::Storage(e.to_string()))?;
        Ok(())
    }
}
