//! # grok-monitor-core
//!
//! Core engine for Grok Monitor - shared by every host (CLI, embedders).
//!
//! This crate provides:
//! - Rate limit interception, state and countdowns (`services::ratelimit`)
//! - Monitor configuration (`config` module)
//! - State database (`db` module)
//! - Unified error handling (`error` module)

pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports for convenience
pub use config::MonitorConfig;
pub use db::Database;
pub use error::{Error, Result};

// Re-export commonly used types from services
pub use services::ratelimit::{
    format_countdown, CallbackTransport, Category, CategoryStatus, HttpRequest, HttpResponse,
    HttpTransport, MonitorEvent, PollingClient, RateLimitMonitor, RateLimitSnapshot, Renderer,
    ReqwestTransport, SnapshotMap, SnapshotStore, SqliteKeyValueStore, StateManager,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
