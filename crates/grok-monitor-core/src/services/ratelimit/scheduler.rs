//! Countdown scheduler
//!
//! One repeating tick source shared by every countdown. It is started lazily
//! when the first deadline is armed and stopped as soon as none is left, so
//! no timer runs while idle.
//!
//! # Lifecycle
//!
//! ```text
//!   stopped ──start()──▶ running ──stop() / handler Break──▶ stopped
//!      ▲                    │
//!      └────────────────────┘   start() while running is a no-op
//! ```
//!
//! The timer task holds only a `Weak` reference to its [`TickHandler`], so
//! dropping the handler also ends the task.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receiver of scheduler ticks
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    /// Process one tick
    ///
    /// Return `Break` once nothing is left to count down. A handler that can
    /// be re-armed concurrently should call [`CountdownScheduler::stop`]
    /// itself while holding its own lock, so a re-arm cannot slip in between
    /// its decision and the timer going away.
    async fn on_tick(&self) -> ControlFlow<()>;
}

struct TimerSlot {
    id: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    period: Duration,
    slot: Mutex<Option<TimerSlot>>,
    timers_started: AtomicU64,
}

impl SchedulerInner {
    /// Forget the slot if it still belongs to timer `id`
    fn release(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.id) == Some(id) {
            *slot = None;
            log::debug!("[ratelimit:scheduler] Timer {} released", id);
        }
    }
}

/// Single shared periodic driver for all countdowns
pub struct CountdownScheduler {
    inner: Arc<SchedulerInner>,
}

impl CountdownScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                period,
                slot: Mutex::new(None),
                timers_started: AtomicU64::new(0),
            }),
        }
    }

    /// Start ticking `handler` unless a timer is already running
    ///
    /// Returns `true` when a new timer was spawned. Requires a tokio runtime;
    /// without one the call logs and returns `false`.
    pub fn start<H: TickHandler>(&self, handler: Weak<H>) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.is_some() {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("[ratelimit:scheduler] Cannot start timer outside a runtime: {}", e);
                return false;
            }
        };

        let id = self.inner.timers_started.fetch_add(1, Ordering::SeqCst) + 1;
        let period = self.inner.period;
        let inner = Arc::downgrade(&self.inner);

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(handler) = handler.upgrade() else {
                    break;
                };
                if handler.on_tick().await.is_break() {
                    break;
                }
            }

            if let Some(inner) = inner.upgrade() {
                inner.release(id);
            }
        });

        *slot = Some(TimerSlot { id, handle });
        log::info!("[ratelimit:scheduler] Timer {} started ({:?} period)", id, period);
        true
    }

    /// Stop the running timer, if any
    ///
    /// Returns `true` when a timer was stopped.
    pub fn stop(&self) -> bool {
        let taken = self.inner.slot.lock().take();
        match taken {
            Some(slot) => {
                slot.handle.abort();
                log::info!("[ratelimit:scheduler] Timer {} stopped", slot.id);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// Number of timers spawned over the scheduler's lifetime
    pub fn timers_started(&self) -> u64 {
        self.inner.timers_started.load(Ordering::SeqCst)
    }
}

impl Drop for CountdownScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
