//! Snapshot storage layer
//!
//! The snapshot map is persisted as one JSON record under a fixed key:
//!
//! ```text
//! {"rateLimitData": {"DEFAULT": {...} | null, "REASONING": ..., "DEEPSEARCH": ...}}
//! ```
//!
//! Older single-category records stored the snapshot itself under
//! `rateLimitData`; those are migrated into the `DEFAULT` slot on load.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use super::types::{Category, RateLimitSnapshot, SnapshotMap};
use crate::db::Database;
use crate::error::Result;

// ============================================================================
// Key-Value Backends
// ============================================================================

/// Durable string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// `kv_store` table in the state database
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create a new store with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool.clone())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local store, for hosts without durable storage
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// Persisted Record
// ============================================================================

/// Serialized form of the snapshot map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub rate_limit_data: SnapshotMap,
}

impl PersistedState {
    pub fn new(rate_limit_data: SnapshotMap) -> Self {
        Self { rate_limit_data }
    }

    /// Encode with every category present, `null` where there is no data
    pub fn to_json(&self) -> Result<String> {
        let mut slots = Map::new();
        for category in Category::ALL {
            let slot = match self.rate_limit_data.get(&category) {
                Some(snapshot) => serde_json::to_value(snapshot)?,
                None => Value::Null,
            };
            slots.insert(category.code().to_string(), slot);
        }

        let mut record = Map::new();
        record.insert("rateLimitData".to_string(), Value::Object(slots));
        Ok(serde_json::to_string(&Value::Object(record))?)
    }

    /// Decode a stored record, migrating the legacy single-category shape
    ///
    /// Invalid entries are dropped individually; only unparseable JSON fails.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;

        let data = match value.get("rateLimitData") {
            Some(Value::Object(data)) => data,
            _ => {
                log::debug!("[ratelimit:store] Record has no rateLimitData object");
                return Ok(Self::default());
            }
        };

        let mut rate_limit_data = SnapshotMap::new();
        let categorized = Category::ALL.iter().any(|c| data.contains_key(c.code()));

        if categorized {
            for category in Category::ALL {
                let Some(slot) = data.get(category.code()) else {
                    continue;
                };
                if slot.is_null() {
                    continue;
                }
                match RateLimitSnapshot::from_value(slot) {
                    Some(snapshot) => {
                        rate_limit_data.insert(category, snapshot);
                    }
                    None => log::warn!(
                        "[ratelimit:store] Dropping invalid persisted snapshot for {}",
                        category
                    ),
                }
            }
        } else if let Some(snapshot) = RateLimitSnapshot::from_value(&Value::Object(data.clone())) {
            log::info!("[ratelimit:store] Migrating legacy single-category record");
            rate_limit_data.insert(Category::Default, snapshot);
        }

        Ok(Self { rate_limit_data })
    }
}

// ============================================================================
// SnapshotStore
// ============================================================================

/// Storage for the snapshot map
///
/// Wraps any [`KeyValueStore`] and owns the storage key.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// In-memory store, mostly for tests and embedding
    pub fn in_memory(key: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()), key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted map; a missing record is an empty map
    pub async fn load(&self) -> Result<SnapshotMap> {
        match self.backend.get(&self.key).await? {
            Some(raw) => Ok(PersistedState::from_json(&raw)?.rate_limit_data),
            None => {
                log::debug!("[ratelimit:store] No persisted record under {}", self.key);
                Ok(SnapshotMap::new())
            }
        }
    }

    /// Persist the full map
    pub async fn save(&self, snapshots: &SnapshotMap) -> Result<()> {
        let record = PersistedState::new(snapshots.clone()).to_json()?;
        self.backend.set(&self.key, &record).await?;
        log::debug!(
            "[ratelimit:store] Saved {} snapshot(s) under {}",
            snapshots.len(),
            self.key
        );
        Ok(())
    }

    /// Erase the persisted record
    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(&self.key).await
    }

    /// Raw stored record, if any
    pub async fn raw(&self) -> Result<Option<String>> {
        self.backend.get(&self.key).await
    }
}

// ============================================================================
// Tests
// ============================================================================
