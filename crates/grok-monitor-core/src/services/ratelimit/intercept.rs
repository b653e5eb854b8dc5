//! Interception layer
//!
//! Decorators around the host's transports that watch traffic to the
//! rate-limit endpoint and turn valid responses into [`Observation`]s.
//!
//! ```text
//!  host ──request──▶ Intercepting*Transport ──▶ inner transport
//!                      │ begin(): marker? endpoint? requestKind?
//!                      │          association table: id → category
//!  host ◀─response── ◀─┤ finish(): 2xx + valid body → Observation ──▶ sink
//! ```
//!
//! The decorators never alter what the host sees: the inner transport's
//! response, error or event stream is handed back unchanged, and any failure
//! while analysing it is swallowed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderName;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::transport::{
    CallbackTransport, HttpRequest, HttpResponse, HttpTransport, ReadyStateCallback,
    ReadyStateEvent, RequestBody,
};
use super::types::{Category, RateLimitSnapshot};
use crate::config::MonitorConfig;
use crate::error::{Error, Result};

/// Identifier of one tracked in-flight request
pub type RequestId = u64;

/// A valid snapshot seen on host traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub request_id: RequestId,
    pub category: Category,
    pub snapshot: RateLimitSnapshot,
}

// ============================================================================
// InterceptionLayer
// ============================================================================

/// Shared analysis state behind both decorators
pub struct InterceptionLayer {
    endpoint_path: String,
    model_name: String,
    marker_header: HeaderName,
    associations: Mutex<HashMap<RequestId, Category>>,
    next_id: AtomicU64,
    sink: UnboundedSender<Observation>,
}

impl InterceptionLayer {
    pub fn new(config: &MonitorConfig, sink: UnboundedSender<Observation>) -> Result<Arc<Self>> {
        let marker_header = HeaderName::from_bytes(config.marker_header.as_bytes()).map_err(|e| {
            Error::config(format!("invalid marker header {:?}: {}", config.marker_header, e))
        })?;

        Ok(Arc::new(Self {
            endpoint_path: config.endpoint_path.clone(),
            model_name: config.model_name.clone(),
            marker_header,
            associations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sink,
        }))
    }

    /// Whether the request carries the self-origin marker
    pub fn is_self_originated(&self, request: &HttpRequest) -> bool {
        request.headers.contains_key(&self.marker_header)
    }

    pub fn is_rate_limit_url(&self, url: &str) -> bool {
        url.contains(&self.endpoint_path)
    }

    /// Category named by an outgoing body, if it is one we track
    ///
    /// Anything that is not a JSON object with a registered `requestKind` and
    /// the configured `modelName` yields `None`.
    pub fn extract_category(&self, body: Option<&RequestBody>) -> Option<Category> {
        let text = body?.as_text()?;
        let value: Value = serde_json::from_str(text).ok()?;

        let model = value.get("modelName")?.as_str()?;
        if model != self.model_name {
            return None;
        }
        Category::from_code(value.get("requestKind")?.as_str()?)
    }

    /// Start tracking `request`
    ///
    /// Returns `None` for requests that must not be analysed: self-originated
    /// ones and anything not aimed at the rate-limit endpoint.
    pub fn begin(&self, request: &HttpRequest) -> Option<RequestId> {
        if self.is_self_originated(request) {
            log::trace!("[ratelimit:intercept] Skipping self-originated {}", request.url);
            return None;
        }
        if !self.is_rate_limit_url(&request.url) {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(category) = self.extract_category(request.body.as_ref()) {
            log::debug!("[ratelimit:intercept] Request {} tagged {}", id, category);
            self.associations.lock().insert(id, category);
        }
        Some(id)
    }

    /// Analyse the terminal response of a tracked request
    ///
    /// Returns the observation that was emitted, if any.
    pub fn finish(&self, id: RequestId, response: &HttpResponse) -> Option<Observation> {
        let category = self.take(id);

        if !response.is_success() {
            log::debug!(
                "[ratelimit:intercept] Request {} ended with HTTP {}, ignored",
                id,
                response.status
            );
            return None;
        }

        let Some(snapshot) = RateLimitSnapshot::parse(&response.body) else {
            log::debug!("[ratelimit:intercept] Request {} body is not a snapshot", id);
            return None;
        };

        let observation = Observation {
            request_id: id,
            category,
            snapshot,
        };
        if self.sink.send(observation.clone()).is_err() {
            log::warn!("[ratelimit:intercept] Observation consumer gone, dropping {}", category);
        }
        Some(observation)
    }

    /// Forget a tracked request that failed without a response
    pub fn abandon(&self, id: RequestId) {
        if self.associations.lock().remove(&id).is_some() {
            log::debug!("[ratelimit:intercept] Request {} failed, association dropped", id);
        }
    }

    /// Number of requests with a recorded category
    pub fn pending(&self) -> usize {
        self.associations.lock().len()
    }

    fn take(&self, id: RequestId) -> Category {
        self.associations.lock().remove(&id).unwrap_or_default()
    }
}

// ============================================================================
// Future-based Decorator
// ============================================================================

/// [`HttpTransport`] that reports rate-limit responses to an
/// [`InterceptionLayer`]
pub struct InterceptingTransport<T> {
    inner: T,
    layer: Arc<InterceptionLayer>,
}

impl<T: HttpTransport> InterceptingTransport<T> {
    pub fn new(inner: T, layer: Arc<InterceptionLayer>) -> Self {
        Self { inner, layer }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for InterceptingTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let Some(id) = self.layer.begin(&request) else {
            return self.inner.send(request).await;
        };

        let result = self.inner.send(request).await;
        match &result {
            Ok(response) => {
                self.layer.finish(id, response);
            }
            Err(e) => {
                log::debug!("[ratelimit:intercept] Request {} failed: {}", id, e);
                self.layer.abandon(id);
            }
        }
        result
    }
}

// ============================================================================
// Callback-based Decorator
// ============================================================================

/// [`CallbackTransport`] that reports rate-limit responses to an
/// [`InterceptionLayer`]
///
/// The host's callback sees every event; the layer looks at terminal ones
/// first.
pub struct InterceptingCallbackTransport<T> {
    inner: T,
    layer: Arc<InterceptionLayer>,
}

impl<T: CallbackTransport> InterceptingCallbackTransport<T> {
    pub fn new(inner: T, layer: Arc<InterceptionLayer>) -> Self {
        Self { inner, layer }
    }
}

impl<T: CallbackTransport> CallbackTransport for InterceptingCallbackTransport<T> {
    fn send(&self, request: HttpRequest, mut on_event: ReadyStateCallback) {
        let Some(id) = self.layer.begin(&request) else {
            self.inner.send(request, on_event);
            return;
        };

        let layer = Arc::clone(&self.layer);
        let mut settled = false;
        let wrapped: ReadyStateCallback = Box::new(move |event: ReadyStateEvent| {
            if !settled {
                match &event {
                    ReadyStateEvent::Done(response) => {
                        settled = true;
                        layer.finish(id, response);
                    }
                    ReadyStateEvent::Failed(reason) => {
                        settled = true;
                        log::debug!("[ratelimit:intercept] Request {} failed: {}", id, reason);
                        layer.abandon(id);
                    }
                    _ => {}
                }
            }
            on_event(event);
        });

        self.inner.send(request, wrapped);
    }
}

// ============================================================================
// Tests
// ============================================================================
