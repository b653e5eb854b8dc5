//! Services module

pub mod ratelimit;

pub use ratelimit::{
    Category, MonitorEvent, RateLimitMonitor, RateLimitSnapshot, Renderer, SnapshotStore,
    StateManager,
};
