//! Outbound transport abstractions
//!
//! Two call styles are supported, matching what a host application uses:
//!
//! - [`HttpTransport`]: future-based, resolves to the full response.
//! - [`CallbackTransport`]: returns immediately and reports progress through
//!   ready-state events delivered to a callback.
//!
//! The interception decorators wrap either style without changing its
//! signature. [`ReqwestTransport`] is the real network implementation and
//! [`SpawningCallbackTransport`] adapts any future-based transport to the
//! callback style.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::error::{Error, Result};

// ============================================================================
// Request / Response
// ============================================================================

/// Outgoing request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Text(String),
    Binary(Bytes),
}

impl RequestBody {
    /// Text content, when the body is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            RequestBody::Binary(_) => None,
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            RequestBody::Text(text) => Bytes::from(text),
            RequestBody::Binary(bytes) => bytes,
        }
    }
}

/// Outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header, rejecting names or values that are not valid HTTP
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::transport(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::transport(format!("invalid header value for {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    /// Serialize `value` as the body and set `Content-Type: application/json`
    pub fn json_body(mut self, value: &Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.text_body(value.to_string())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Completed HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

// ============================================================================
// Future-based Transport
// ============================================================================

/// Future-based transport
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).send(request).await
    }
}

/// Network transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body.into_bytes());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ============================================================================
// Callback-based Transport
// ============================================================================

/// Progress of a callback-style request
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyStateEvent {
    /// Request accepted and dispatched
    Opened,
    /// Status line and headers are known
    HeadersReceived { status: u16 },
    /// Terminal: full response available
    Done(HttpResponse),
    /// Terminal: the request failed before a response arrived
    Failed(String),
}

impl ReadyStateEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadyStateEvent::Done(_) | ReadyStateEvent::Failed(_))
    }
}

pub type ReadyStateCallback = Box<dyn FnMut(ReadyStateEvent) + Send + 'static>;

/// Callback-based transport
///
/// `send` returns immediately; every request ends with exactly one terminal
/// event.
pub trait CallbackTransport: Send + Sync {
    fn send(&self, request: HttpRequest, on_event: ReadyStateCallback);
}

/// Runs a future-based transport on the tokio runtime and reports
/// ready-state events as it progresses
pub struct SpawningCallbackTransport<T> {
    inner: Arc<T>,
}

impl<T: HttpTransport + 'static> SpawningCallbackTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl<T: HttpTransport + 'static> CallbackTransport for SpawningCallbackTransport<T> {
    fn send(&self, request: HttpRequest, mut on_event: ReadyStateCallback) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                on_event(ReadyStateEvent::Failed(format!("no async runtime: {}", e)));
                return;
            }
        };

        on_event(ReadyStateEvent::Opened);

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            match inner.send(request).await {
                Ok(response) => {
                    on_event(ReadyStateEvent::HeadersReceived {
                        status: response.status,
                    });
                    on_event(ReadyStateEvent::Done(response));
                }
                Err(e) => on_event(ReadyStateEvent::Failed(e.to_string())),
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct EchoTransport;

    #[async_trait]
    impl HttpTransport for EchoTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            if request.url.ends_with("/fail") {
                return Err(Error::transport("connection reset"));
            }
            let body = request.body.map(RequestBody::into_bytes).unwrap_or_default();
            Ok(HttpResponse::new(200, body))
        }
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::post("https://grok.com/rest/rate-limits")
            .header("X-Query-Type", "DEFAULT")
            .unwrap()
            .json_body(&json!({"requestKind": "DEFAULT"}));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.header_value("x-query-type"), Some("DEFAULT"));
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(
            request.body.as_ref().and_then(RequestBody::as_text),
            Some(r#"{"requestKind":"DEFAULT"}"#)
        );
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = HttpRequest::get("/").header("bad header", "x").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(429, "").is_success());
        assert_eq!(HttpResponse::new(200, "ok").text(), "ok");
    }

    #[tokio::test]
    async fn test_spawning_callback_transport_reports_done() {
        let transport = SpawningCallbackTransport::new(EchoTransport);
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.send(
            HttpRequest::post("https://example.test/echo").text_body("hello"),
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        assert_eq!(rx.recv().await, Some(ReadyStateEvent::Opened));
        assert_eq!(
            rx.recv().await,
            Some(ReadyStateEvent::HeadersReceived { status: 200 })
        );
        assert_eq!(
            rx.recv().await,
            Some(ReadyStateEvent::Done(HttpResponse::new(200, "hello")))
        );
    }

    #[tokio::test]
    async fn test_spawning_callback_transport_reports_failure() {
        let transport = SpawningCallbackTransport::new(EchoTransport);
        let (tx, mut rx) = mpsc::unbounded_channel();

        transport.send(
            HttpRequest::get("https://example.test/fail"),
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        assert_eq!(rx.recv().await, Some(ReadyStateEvent::Opened));
        match rx.recv().await {
            Some(ReadyStateEvent::Failed(message)) => assert!(message.contains("connection reset")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_spawning_callback_transport_without_runtime() {
        let transport = SpawningCallbackTransport::new(EchoTransport);
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        transport.send(
            HttpRequest::get("https://example.test/echo"),
            Box::new(move |event| sink.lock().push(event)),
        );

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }
}
