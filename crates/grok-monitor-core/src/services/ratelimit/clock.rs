//! Millisecond clocks for deadline arithmetic

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Source of epoch-millisecond timestamps
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock sampled once, then advanced by the tokio monotonic clock
///
/// Deadlines therefore follow tokio time: wall-clock jumps after startup do
/// not move countdowns, and paused-time tests drive them deterministically.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch_ms: u64,
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for hosts that simulate time
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
