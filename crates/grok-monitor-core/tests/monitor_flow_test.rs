//! Integration tests for the monitor: warm-up, interception, expiry re-polls
//! and persistence across restarts

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grok_monitor_core::db::Database;
use grok_monitor_core::services::ratelimit::{
    CallbackTransport, HttpRequest, HttpResponse, HttpTransport, KeyValueStore, MonitorEvent,
    RateLimitMonitor, RateLimitSnapshot, ReadyStateEvent, SnapshotStore,
    SpawningCallbackTransport, SqliteKeyValueStore, StateManager,
};
use grok_monitor_core::{Category, Error, MonitorConfig, Result};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const ENDPOINT: &str = "https://grok.com/rest/rate-limits";

/// Fake network: replies are queued per marker value, unmarked traffic uses
/// the `host` queue; an empty queue answers with 10 remaining queries
#[derive(Default)]
struct ScriptedNetwork {
    replies: Mutex<HashMap<String, VecDeque<Result<HttpResponse>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, queue: &str, reply: Result<HttpResponse>) {
        self.replies
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(reply);
    }

    fn polls_for(&self, category: Category) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.header_value("X-Query-Type") == Some(category.code()))
            .count()
    }

    fn poll_order(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r.header_value("X-Query-Type").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedNetwork {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let queue = request
            .header_value("X-Query-Type")
            .unwrap_or("host")
            .to_string();
        self.requests.lock().push(request);

        self.replies
            .lock()
            .get_mut(&queue)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(snapshot_response(10, None)))
    }
}

fn snapshot_response(remaining: u64, wait: Option<u64>) -> HttpResponse {
    let mut body = json!({
        "windowSizeSeconds": 10800,
        "totalQueries": 20,
        "remainingQueries": remaining,
    });
    if let Some(wait) = wait {
        body["waitTimeSeconds"] = json!(wait);
    }
    HttpResponse::new(200, body.to_string())
}

fn host_request(kind: &str) -> HttpRequest {
    HttpRequest::post(ENDPOINT).json_body(&json!({"requestKind": kind, "modelName": "grok-3"}))
}

async fn start_monitor(
    config: MonitorConfig,
    store: SnapshotStore,
    network: Arc<ScriptedNetwork>,
) -> (RateLimitMonitor, UnboundedReceiver<MonitorEvent>) {
    let (events_tx, events) = mpsc::unbounded_channel();
    let monitor = RateLimitMonitor::start(config, store, network, Arc::new(events_tx))
        .await
        .expect("monitor should start");
    (monitor, events)
}

fn drain(events: &mut UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Config whose warm-up stays out of the way of the test body
fn quiet_config() -> MonitorConfig {
    MonitorConfig {
        startup_delay_ms: 3_600_000,
        ..MonitorConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_warm_up_polls_each_category_in_order() {
    let network = ScriptedNetwork::new();
    let (monitor, _events) =
        start_monitor(MonitorConfig::default(), SnapshotStore::in_memory("k"), network.clone())
            .await;

    assert_eq!(monitor.wait_for_warm_up().await, Some(3));
    assert_eq!(network.poll_order(), vec!["DEFAULT", "REASONING", "DEEPSEARCH"]);
    assert_eq!(monitor.state().snapshots().await.len(), 3);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_expiry_triggers_exactly_one_repoll() {
    let network = ScriptedNetwork::new();
    network.script("DEFAULT", Ok(snapshot_response(0, Some(5))));
    network.script("DEFAULT", Ok(snapshot_response(20, None)));

    let (monitor, mut events) =
        start_monitor(MonitorConfig::default(), SnapshotStore::in_memory("k"), network.clone())
            .await;
    monitor.wait_for_warm_up().await;

    let state = monitor.state().clone();
    assert!(state.deadline(Category::Default).await.is_some());
    assert!(state.is_timer_running());

    // DEFAULT was applied 2s after start; its countdown ends at 7s
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(network.polls_for(Category::Default), 2);
    assert_eq!(
        state.snapshot(Category::Default).await.map(|s| s.remaining_queries),
        Some(20)
    );
    assert_eq!(state.deadline(Category::Default).await, None);
    assert!(!state.is_timer_running());

    let ticks: Vec<u64> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            MonitorEvent::CountdownTick {
                category: Category::Default,
                remaining_secs,
            } => Some(remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![5, 4, 3, 2, 1, 0]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(network.polls_for(Category::Default), 2);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_intercepted_host_traffic_updates_state() {
    let network = ScriptedNetwork::new();
    let (monitor, _events) =
        start_monitor(quiet_config(), SnapshotStore::in_memory("k"), network.clone()).await;
    let host = monitor.intercept(network.clone());

    network.script("host", Ok(snapshot_response(4, None)));
    let response = host.send(host_request("REASONING")).await.unwrap();
    assert_eq!(response.status, 200);

    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = monitor.state();
    assert_eq!(
        state.snapshot(Category::Reasoning).await,
        Some(RateLimitSnapshot::new(10800, 20, 4))
    );
    assert_eq!(state.snapshot(Category::Default).await, None);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_callback_host_traffic_updates_state() {
    let network = ScriptedNetwork::new();
    let (monitor, _events) =
        start_monitor(quiet_config(), SnapshotStore::in_memory("k"), network.clone()).await;
    let host = monitor.intercept_callbacks(SpawningCallbackTransport::new(network.clone()));

    network.script("host", Ok(snapshot_response(3, None)));
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    host.send(
        host_request("REASONING"),
        Box::new(move |event| {
            let _ = seen_tx.send(event);
        }),
    );

    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut received = Vec::new();
    while let Ok(event) = seen.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            ReadyStateEvent::Opened,
            ReadyStateEvent::HeadersReceived { status: 200 },
            ReadyStateEvent::Done(snapshot_response(3, None)),
        ]
    );

    assert_eq!(
        monitor.state().snapshot(Category::Reasoning).await,
        Some(RateLimitSnapshot::new(10800, 20, 3))
    );
    assert_eq!(monitor.state().snapshot(Category::Default).await, None);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_marked_and_malformed_responses_do_not_change_state() {
    let network = ScriptedNetwork::new();
    let (monitor, _events) =
        start_monitor(quiet_config(), SnapshotStore::in_memory("k"), network.clone()).await;
    let host = monitor.intercept(network.clone());

    monitor
        .state()
        .apply(Category::Default, RateLimitSnapshot::new(10800, 20, 15))
        .await;

    // Looks valid, but carries the marker
    let marked = host_request("DEFAULT").header("X-Query-Type", "DEFAULT").unwrap();
    network.script("DEFAULT", Ok(snapshot_response(1, None)));
    host.send(marked).await.unwrap();

    network.script("host", Ok(HttpResponse::new(200, "not json")));
    let response = host.send(host_request("DEFAULT")).await.unwrap();
    assert_eq!(response.text(), "not json");

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        monitor.state().snapshot(Category::Default).await,
        Some(RateLimitSnapshot::new(10800, 20, 15))
    );

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_polls_directly() {
    let network = ScriptedNetwork::new();
    network.script("DEEPSEARCH", Err(Error::transport("offline")));

    let (monitor, _events) =
        start_monitor(quiet_config(), SnapshotStore::in_memory("k"), network.clone()).await;

    assert!(monitor.request_manual_refresh(Category::DeepSearch).await.is_none());
    assert_eq!(monitor.state().snapshot(Category::DeepSearch).await, None);

    let refreshed = monitor.request_manual_refresh(Category::DeepSearch).await;
    assert_eq!(refreshed.map(|s| s.remaining_queries), Some(10));
    assert_eq!(network.polls_for(Category::DeepSearch), 2);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_startup_resets_or_resumes_previous_session() {
    let store = SnapshotStore::in_memory("grok-monitor-data");
    let mut previous = grok_monitor_core::SnapshotMap::new();
    previous.insert(Category::Reasoning, RateLimitSnapshot::new(7200, 30, 2));
    store.save(&previous).await.unwrap();

    let resume = MonitorConfig {
        resume_previous_session: true,
        ..quiet_config()
    };
    let (monitor, _events) = start_monitor(resume, store.clone(), ScriptedNetwork::new()).await;
    assert_eq!(monitor.state().snapshots().await, previous);
    monitor.shutdown().await;
    drop(monitor);

    let (monitor, _events) = start_monitor(quiet_config(), store.clone(), ScriptedNetwork::new()).await;
    assert!(monitor.state().snapshots().await.is_empty());
    monitor.shutdown().await;
    assert_eq!(store.load().await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(temp_dir.path().join("state.db"))
        .await
        .expect("Failed to open state database");
    let store = SnapshotStore::new(
        Arc::new(SqliteKeyValueStore::from_database(&db)),
        "grok-monitor-data",
    );

    let first = StateManager::builder(store.clone()).build();
    first
        .apply(Category::Default, RateLimitSnapshot::new(10800, 20, 0).with_wait_time(30))
        .await;
    first
        .apply(Category::DeepSearch, RateLimitSnapshot::new(86400, 10, 9))
        .await;
    let expected = first.snapshots().await;
    first.shutdown().await;
    drop(first);

    let second = StateManager::builder(store).build();
    assert_eq!(second.restore().await, 2);
    assert_eq!(second.snapshots().await, expected);
    assert_eq!(second.deadline(Category::Default).await, None);
}

#[tokio::test]
async fn test_sqlite_legacy_record_is_migrated() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(temp_dir.path().join("state.db"))
        .await
        .expect("Failed to open state database");
    let backend = Arc::new(SqliteKeyValueStore::from_database(&db));

    let legacy = json!({
        "rateLimitData": {"windowSizeSeconds": 7200, "totalQueries": 30, "remainingQueries": 6}
    });
    backend
        .set("grok-monitor-data", &legacy.to_string())
        .await
        .unwrap();

    let state = StateManager::builder(SnapshotStore::new(backend, "grok-monitor-data")).build();
    assert_eq!(state.restore().await, 1);

    let snapshots = state.snapshots().await;
    assert_eq!(
        snapshots.get(&Category::Default),
        Some(&RateLimitSnapshot::new(7200, 30, 6))
    );
    assert!(!snapshots.contains_key(&Category::Reasoning));
}
