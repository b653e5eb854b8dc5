//! Rate limit state manager
//!
//! Owns the live snapshot map and the per-category countdown deadlines.
//! Everything that changes state goes through here:
//!
//! - [`StateManager::apply`] stores a new snapshot, recomputes the category's
//!   deadline, persists the map and arms the shared scheduler.
//! - [`StateManager::reset`] wipes memory and storage at startup.
//! - [`StateManager::on_expiry`] fires when a countdown reaches zero and asks
//!   the polling side for a fresh snapshot.
//!
//! All mutations are serialized by one async mutex; renderer notifications
//! are emitted while it is held, so they arrive in mutation order.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc::UnboundedSender, Mutex};

use super::clock::{Clock, SystemClock};
use super::events::{NullRenderer, Renderer};
use super::scheduler::{CountdownScheduler, TickHandler};
use super::store::SnapshotStore;
use super::types::{Category, RateLimitSnapshot, SnapshotMap, SnapshotView};
use crate::config::DEFAULT_TICK_INTERVAL_MS;
use crate::error::{Error, Result};

/// Seconds left until `deadline`, rounded up
fn ceil_seconds(deadline_ms: u64, now_ms: u64) -> u64 {
    deadline_ms.saturating_sub(now_ms).div_ceil(1000)
}

#[derive(Debug, Default)]
struct StateInner {
    snapshots: SnapshotMap,
    /// Absolute epoch-ms deadlines; only armed categories have an entry
    deadlines: BTreeMap<Category, u64>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`StateManager`]
pub struct StateManagerBuilder {
    store: SnapshotStore,
    tick_interval: Duration,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn Renderer>,
    refresh_tx: Option<UnboundedSender<Category>>,
}

impl StateManagerBuilder {
    /// Set the countdown tick period
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Set the clock deadlines are computed against
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the rendering collaborator
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Where expiry-triggered refresh requests are sent
    pub fn with_refresh_sink(mut self, refresh_tx: UnboundedSender<Category>) -> Self {
        self.refresh_tx = Some(refresh_tx);
        self
    }

    pub fn build(self) -> Arc<StateManager> {
        Arc::new_cyclic(|self_ref| StateManager {
            self_ref: self_ref.clone(),
            inner: Mutex::new(StateInner::default()),
            store: self.store,
            scheduler: CountdownScheduler::new(self.tick_interval),
            clock: self.clock,
            renderer: self.renderer,
            refresh_tx: self.refresh_tx,
        })
    }
}

// ============================================================================
// StateManager
// ============================================================================

/// Single owner of snapshot and countdown state
pub struct StateManager {
    self_ref: Weak<StateManager>,
    inner: Mutex<StateInner>,
    store: SnapshotStore,
    scheduler: CountdownScheduler,
    clock: Arc<dyn Clock>,
    renderer: Arc<dyn Renderer>,
    refresh_tx: Option<UnboundedSender<Category>>,
}

impl StateManager {
    pub fn builder(store: SnapshotStore) -> StateManagerBuilder {
        StateManagerBuilder {
            store,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            clock: Arc::new(SystemClock::new()),
            renderer: Arc::new(NullRenderer),
            refresh_tx: None,
        }
    }

    /// Replace the snapshot for `category`
    ///
    /// An exhausted snapshot with a wait time arms a countdown of
    /// `waitTimeSeconds`; a snapshot with queries left clears any countdown.
    /// Storage errors are logged and do not fail the call.
    pub async fn apply(&self, category: Category, snapshot: RateLimitSnapshot) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        let mut armed_secs = None;
        let mut cleared = false;

        if let Some(wait_secs) = snapshot.countdown_seconds() {
            let deadline = now.saturating_add(wait_secs.saturating_mul(1000));
            inner.deadlines.insert(category, deadline);
            armed_secs = Some(wait_secs);
            log::info!(
                "[ratelimit:state] {} exhausted, countdown {}s (deadline {})",
                category,
                wait_secs,
                deadline
            );
        } else if snapshot.remaining_queries > 0 {
            cleared = inner.deadlines.remove(&category).is_some();
        }

        inner.snapshots.insert(category, snapshot.clone());
        log::debug!(
            "[ratelimit:state] {} updated: {}/{} remaining",
            category,
            snapshot.remaining_queries,
            snapshot.total_queries
        );

        self.persist(&inner.snapshots).await;

        // A zero wait is due on the next tick, so any entry needs the timer
        if !inner.deadlines.is_empty() {
            self.arm();
        }

        self.renderer.on_snapshot_changed(category, Some(&snapshot));
        if cleared {
            self.renderer.on_countdown_cleared(category);
        }
        if let Some(secs) = armed_secs {
            self.renderer.on_countdown_tick(category, secs);
        }
    }

    /// Validate an untyped submission and apply it
    pub async fn apply_raw(&self, code: &str, body: &Value) -> Result<()> {
        let category = Category::from_code(code).ok_or_else(|| Error::unknown_category(code))?;
        let snapshot = RateLimitSnapshot::from_value(body)
            .ok_or_else(|| Error::invalid_snapshot(format!("rejected body for {}", category)))?;

        self.apply(category, snapshot).await;
        Ok(())
    }

    /// Drop all snapshots and countdowns, stop the timer and erase storage
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;

        self.scheduler.stop();
        let snapshots = std::mem::take(&mut inner.snapshots);
        let deadlines = std::mem::take(&mut inner.deadlines);

        if let Err(e) = self.store.clear().await {
            log::error!("[ratelimit:state] Failed to erase persisted state: {}", e);
        }

        for category in deadlines.keys() {
            self.renderer.on_countdown_cleared(*category);
        }
        for category in snapshots.keys() {
            self.renderer.on_snapshot_changed(*category, None);
        }

        log::info!("[ratelimit:state] All state reset");
    }

    /// Load the persisted map without arming countdowns
    ///
    /// Returns the number of snapshots restored. Unreadable storage counts
    /// as empty.
    pub async fn restore(&self) -> usize {
        let loaded = match self.store.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("[ratelimit:state] Failed to load persisted state: {}", e);
                return 0;
            }
        };

        let mut inner = self.inner.lock().await;
        for (category, snapshot) in &loaded {
            inner.snapshots.insert(*category, snapshot.clone());
            self.renderer.on_snapshot_changed(*category, Some(snapshot));
        }

        log::info!("[ratelimit:state] Restored {} snapshot(s)", loaded.len());
        loaded.len()
    }

    /// Countdown for `category` reached zero
    pub async fn on_expiry(&self, category: Category) {
        let mut inner = self.inner.lock().await;
        self.expire_locked(&mut inner, category);
    }

    fn expire_locked(&self, inner: &mut StateInner, category: Category) {
        inner.deadlines.remove(&category);
        log::info!("[ratelimit:state] {} countdown finished, requesting refresh", category);

        self.renderer.on_countdown_tick(category, 0);
        self.request_refresh(category);
    }

    fn request_refresh(&self, category: Category) {
        match &self.refresh_tx {
            Some(tx) => {
                if tx.send(category).is_err() {
                    log::warn!("[ratelimit:state] Refresh consumer gone, {} stays stale", category);
                }
            }
            None => log::debug!("[ratelimit:state] No refresh sink for {}", category),
        }
    }

    /// Write the current map to storage
    pub async fn persist_now(&self) {
        let inner = self.inner.lock().await;
        self.persist(&inner.snapshots).await;
    }

    /// Stop the countdown timer and write a final copy of the map
    ///
    /// Deadlines stay in memory; a later `apply` re-arms the timer.
    pub async fn shutdown(&self) {
        let inner = self.inner.lock().await;
        self.scheduler.stop();
        self.persist(&inner.snapshots).await;
    }

    async fn persist(&self, snapshots: &SnapshotMap) {
        if let Err(e) = self.store.save(snapshots).await {
            log::error!("[ratelimit:state] Failed to persist snapshots: {}", e);
        }
    }

    fn arm(&self) {
        if self.scheduler.start(self.self_ref.clone()) {
            log::debug!("[ratelimit:state] Countdown timer armed");
        }
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    pub async fn snapshot(&self, category: Category) -> Option<RateLimitSnapshot> {
        self.inner.lock().await.snapshots.get(&category).cloned()
    }

    pub async fn snapshots(&self) -> SnapshotMap {
        self.inner.lock().await.snapshots.clone()
    }

    /// Absolute deadline (epoch ms), if a countdown is armed
    pub async fn deadline(&self, category: Category) -> Option<u64> {
        self.inner.lock().await.deadlines.get(&category).copied()
    }

    /// Whole seconds left on the countdown, if armed and not yet due
    pub async fn remaining_seconds(&self, category: Category) -> Option<u64> {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .await
            .deadlines
            .get(&category)
            .filter(|&&deadline| deadline > now)
            .map(|&deadline| ceil_seconds(deadline, now))
    }

    /// Snapshot plus countdown per category, for renderers
    pub async fn view(&self) -> BTreeMap<Category, CategoryStatus> {
        let now = self.clock.now_ms();
        let inner = self.inner.lock().await;

        Category::ALL
            .into_iter()
            .map(|category| {
                let snapshot = inner.snapshots.get(&category).cloned();
                let countdown_secs = inner
                    .deadlines
                    .get(&category)
                    .filter(|&&deadline| deadline > now)
                    .map(|&deadline| ceil_seconds(deadline, now));
                let status = CategoryStatus {
                    view: snapshot.as_ref().map(RateLimitSnapshot::view),
                    snapshot,
                    countdown_secs,
                };
                (category, status)
            })
            .collect()
    }

    pub fn is_timer_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Timers spawned so far; grows by one per arm after a full stop
    pub fn timers_started(&self) -> u64 {
        self.scheduler.timers_started()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// What a renderer needs for one category
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoryStatus {
    pub snapshot: Option<RateLimitSnapshot>,
    pub view: Option<SnapshotView>,
    pub countdown_secs: Option<u64>,
}

#[async_trait]
impl TickHandler for StateManager {
    async fn on_tick(&self) -> ControlFlow<()> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().await;

        let mut expired = Vec::new();
        for (&category, &deadline) in &inner.deadlines {
            if deadline > now {
                self.renderer
                    .on_countdown_tick(category, ceil_seconds(deadline, now));
            } else {
                expired.push(category);
            }
        }

        for category in expired {
            self.expire_locked(&mut inner, category);
        }

        if !inner.deadlines.is_empty() {
            ControlFlow::Continue(())
        } else {
            // Stopped under the state lock so a concurrent apply re-arms cleanly
            self.scheduler.stop();
            ControlFlow::Break(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
