//! Polling client
//!
//! Self-originated requests for one category at a time. Every request
//! carries the marker header so the interception layer leaves it alone; the
//! result is applied to the state manager directly.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::state::StateManager;
use super::transport::{HttpRequest, HttpTransport};
use super::types::{Category, RateLimitSnapshot};
use crate::config::MonitorConfig;
use crate::error::{Error, Result};

pub struct PollingClient {
    transport: Arc<dyn HttpTransport>,
    state: Arc<StateManager>,
    endpoint_url: String,
    model_name: String,
    marker_header: String,
    cookie: Option<String>,
    warm_up_delay: Duration,
}

impl PollingClient {
    pub fn new(
        config: &MonitorConfig,
        transport: Arc<dyn HttpTransport>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            transport,
            state,
            endpoint_url: config.endpoint_url(),
            model_name: config.model_name.clone(),
            marker_header: config.marker_header.clone(),
            cookie: config.cookie.clone(),
            warm_up_delay: config.warm_up_delay(),
        }
    }

    /// Build the marked request for `category`
    pub fn build_request(&self, category: Category) -> Result<HttpRequest> {
        let body = json!({
            "requestKind": category.code(),
            "modelName": self.model_name,
        });

        let mut request = HttpRequest::post(&self.endpoint_url)
            .json_body(&body)
            .header(&self.marker_header, category.code())?;
        if let Some(cookie) = &self.cookie {
            request = request.header("Cookie", cookie)?;
        }
        Ok(request)
    }

    /// Poll one category and apply the result
    pub async fn fetch_snapshot(&self, category: Category) -> Result<RateLimitSnapshot> {
        log::info!("[ratelimit:poller] Fetching {} rate limits", category);

        let request = self.build_request(category)?;
        let response = self.transport.send(request).await?;

        log::debug!("[ratelimit:poller] {} response status: {}", category, response.status);
        if !response.is_success() {
            log::warn!("[ratelimit:poller] {} poll failed: HTTP {}", category, response.status);
            return Err(Error::Status(response.status));
        }

        let snapshot = RateLimitSnapshot::parse(&response.body).ok_or_else(|| {
            let preview: String = response.text().chars().take(200).collect();
            Error::invalid_snapshot(format!("{} response: {}", category, preview))
        })?;

        self.state.apply(category, snapshot.clone()).await;
        log::info!(
            "[ratelimit:poller] {} refreshed: {}/{} remaining",
            category,
            snapshot.remaining_queries,
            snapshot.total_queries
        );
        Ok(snapshot)
    }

    /// [`fetch_snapshot`](Self::fetch_snapshot) with failures logged
    pub async fn refresh(&self, category: Category) -> Option<RateLimitSnapshot> {
        match self.fetch_snapshot(category).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                log::error!("[ratelimit:poller] Failed to refresh {}: {}", category, e);
                None
            }
        }
    }

    /// Poll `categories` one after another, pausing after each request
    ///
    /// Returns how many polls succeeded.
    pub async fn warm_up(&self, categories: &[Category]) -> usize {
        let mut refreshed = 0;
        for &category in categories {
            if self.refresh(category).await.is_some() {
                refreshed += 1;
            }
            tokio::time::sleep(self.warm_up_delay).await;
        }

        log::info!(
            "[ratelimit:poller] Warm-up done: {}/{} categories",
            refreshed,
            categories.len()
        );
        refreshed
    }
}

// ============================================================================
// Tests
// ============================================================================
