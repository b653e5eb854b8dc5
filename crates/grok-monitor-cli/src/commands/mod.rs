//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod categories;
pub mod refresh;
pub mod reset;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use grok_monitor_core::{Database, MonitorConfig, SnapshotStore, SqliteKeyValueStore};

use crate::output::OutputFormat;

/// Shared context for all commands
pub struct Context {
    pub config: MonitorConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    /// Open the state database and the snapshot store inside it
    pub async fn open_store(&self) -> Result<SnapshotStore> {
        let db = Database::new().await?;
        let backend = Arc::new(SqliteKeyValueStore::from_database(&db));
        Ok(SnapshotStore::new(backend, self.config.storage_key.clone()))
    }
}
