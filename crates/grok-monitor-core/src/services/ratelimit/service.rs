//! Monitor composition root
//!
//! Wires the state manager, interception layer and polling client together
//! and owns the background tasks that connect them:
//!
//! - observation pump: intercepted snapshots → `StateManager::apply`
//! - refresh pump: countdown expiries → `PollingClient::refresh`
//! - autosave: periodic `StateManager::persist_now`
//! - warm-up: startup delay, then one poll per category

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::clock::{Clock, SystemClock};
use super::events::Renderer;
use super::intercept::{InterceptingCallbackTransport, InterceptingTransport, InterceptionLayer};
use super::poller::PollingClient;
use super::state::StateManager;
use super::store::SnapshotStore;
use super::transport::{CallbackTransport, HttpTransport};
use super::types::{Category, RateLimitSnapshot};
use crate::config::MonitorConfig;
use crate::error::Result;

/// Running rate-limit monitor
pub struct RateLimitMonitor {
    config: MonitorConfig,
    state: Arc<StateManager>,
    poller: Arc<PollingClient>,
    layer: Arc<InterceptionLayer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    warm_up: Mutex<Option<JoinHandle<usize>>>,
}

impl RateLimitMonitor {
    /// Start the monitor against the system clock
    pub async fn start(
        config: MonitorConfig,
        store: SnapshotStore,
        transport: Arc<dyn HttpTransport>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        Self::start_with_clock(config, store, transport, renderer, Arc::new(SystemClock::new()))
            .await
    }

    /// Start the monitor
    ///
    /// Clears (or, with `resume_previous_session`, restores) the stored
    /// state, spawns the background tasks and schedules the warm-up polls.
    /// `transport` carries the monitor's own polls.
    pub async fn start_with_clock(
        config: MonitorConfig,
        store: SnapshotStore,
        transport: Arc<dyn HttpTransport>,
        renderer: Arc<dyn Renderer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let config = config.validate();
        let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
        let (observation_tx, mut observation_rx) = mpsc::unbounded_channel();

        let layer = InterceptionLayer::new(&config, observation_tx)?;

        let state = StateManager::builder(store)
            .with_tick_interval(config.tick_interval())
            .with_clock(clock)
            .with_renderer(renderer)
            .with_refresh_sink(refresh_tx)
            .build();

        if config.resume_previous_session {
            state.restore().await;
        } else {
            state.reset().await;
        }

        let poller = Arc::new(PollingClient::new(&config, transport, Arc::clone(&state)));
        let mut tasks = Vec::new();

        let pump_state = Arc::clone(&state);
        tasks.push(tokio::spawn(async move {
            while let Some(observation) = observation_rx.recv().await {
                log::debug!(
                    "[ratelimit:monitor] Applying intercepted {} snapshot (request {})",
                    observation.category,
                    observation.request_id
                );
                pump_state
                    .apply(observation.category, observation.snapshot)
                    .await;
            }
        }));

        let pump_poller = Arc::clone(&poller);
        tasks.push(tokio::spawn(async move {
            while let Some(category) = refresh_rx.recv().await {
                pump_poller.refresh(category).await;
            }
        }));

        if let Some(period) = config.autosave_interval() {
            let autosave_state = Arc::clone(&state);
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    log::trace!("[ratelimit:monitor] Autosave");
                    autosave_state.persist_now().await;
                }
            }));
        }

        let startup_delay = config.startup_delay();
        let warm_up_poller = Arc::clone(&poller);
        let warm_up = tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            warm_up_poller.warm_up(&Category::ALL).await
        });

        log::info!(
            "[ratelimit:monitor] Started against {} (warm-up in {:?})",
            config.endpoint_url(),
            startup_delay
        );

        Ok(Self {
            config,
            state,
            poller,
            layer,
            tasks: Mutex::new(tasks),
            warm_up: Mutex::new(Some(warm_up)),
        })
    }

    /// Wrap a future-based host transport so its rate-limit traffic is observed
    pub fn intercept<T: HttpTransport>(&self, inner: T) -> InterceptingTransport<T> {
        InterceptingTransport::new(inner, Arc::clone(&self.layer))
    }

    /// Wrap a callback-based host transport so its rate-limit traffic is observed
    pub fn intercept_callbacks<T: CallbackTransport>(
        &self,
        inner: T,
    ) -> InterceptingCallbackTransport<T> {
        InterceptingCallbackTransport::new(inner, Arc::clone(&self.layer))
    }

    /// User-requested refresh of one category
    pub async fn request_manual_refresh(&self, category: Category) -> Option<RateLimitSnapshot> {
        log::info!("[ratelimit:monitor] Manual refresh of {}", category);
        self.poller.refresh(category).await
    }

    /// Wait for the startup warm-up to finish
    ///
    /// Returns the number of categories refreshed, or `None` if the warm-up
    /// was already awaited or cancelled.
    pub async fn wait_for_warm_up(&self) -> Option<usize> {
        let handle = self.warm_up.lock().take()?;
        handle.await.ok()
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn poller(&self) -> &Arc<PollingClient> {
        &self.poller
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Stop background work and save the current map
    pub async fn shutdown(&self) {
        self.abort_tasks();
        self.state.shutdown().await;
        log::info!("[ratelimit:monitor] Shut down");
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(warm_up) = self.warm_up.lock().take() {
            warm_up.abort();
        }
    }
}

impl Drop for RateLimitMonitor {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
