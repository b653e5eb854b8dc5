//! Rate limit monitoring module
//!
//! Observes traffic to Grok's rate-limit endpoint, keeps the latest quota
//! snapshot per usage category and counts down to each window reset,
//! re-polling a category as soon as its countdown expires.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   Observation   ┌──────────────────────────┐
//! │ InterceptionLayer    │ ──────────────▶ │ StateManager             │
//! │  - begin()/finish()  │                 │  - apply() / apply_raw() │
//! │  - id → category     │                 │  - reset() / restore()   │
//! └──────────────────────┘                 │  - on_expiry()           │
//!          ▲                               └──────────────────────────┘
//!          │ decorates                       │        │          │
//! ┌──────────────────────┐                   ▼        ▼          ▼
//! │ Host transports      │         SnapshotStore  Countdown   Renderer
//! │ (future / callback)  │         (SQLite kv)    Scheduler   (UI side)
//! └──────────────────────┘                            │ expiry
//!                                                     ▼
//!                                          ┌──────────────────────────┐
//!                                          │ PollingClient            │
//!                                          │  - fetch_snapshot()      │
//!                                          │  - warm_up()             │
//!                                          └──────────────────────────┘
//! ```
//!
//! [`RateLimitMonitor`] is the composition root that builds the graph and
//! runs the background pumps.
//!
//! # Usage
//!
//! ```ignore
//! use grok_monitor_core::services::ratelimit::{RateLimitMonitor, ReqwestTransport, SnapshotStore};
//!
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let monitor = RateLimitMonitor::start(
//!     MonitorConfig::from_env(),
//!     SnapshotStore::in_memory(DEFAULT_STORAGE_KEY),
//!     Arc::new(ReqwestTransport::default()),
//!     Arc::new(events_tx),
//! )
//! .await?;
//!
//! // Host traffic goes through the decorator
//! let http = monitor.intercept(ReqwestTransport::default());
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod clock;
pub mod events;
pub mod intercept;
pub mod poller;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{MonitorEvent, NullRenderer, Renderer};
pub use intercept::{
    InterceptingCallbackTransport, InterceptingTransport, InterceptionLayer, Observation,
    RequestId,
};
pub use poller::PollingClient;
pub use scheduler::{CountdownScheduler, TickHandler};
pub use service::RateLimitMonitor;
pub use state::{CategoryStatus, StateManager, StateManagerBuilder};
pub use store::{
    KeyValueStore, MemoryKeyValueStore, PersistedState, SnapshotStore, SqliteKeyValueStore,
};
pub use transport::{
    CallbackTransport, HttpRequest, HttpResponse, HttpTransport, ReadyStateCallback,
    ReadyStateEvent, ReqwestTransport, RequestBody, SpawningCallbackTransport,
};
pub use types::{
    format_countdown, Category, CategoryInfo, RateLimitSnapshot, RemainingLevel, SnapshotMap,
    SnapshotView,
};
