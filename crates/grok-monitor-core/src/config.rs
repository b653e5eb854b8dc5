//! Monitor configuration
//!
//! Every knob of the monitor lives in [`MonitorConfig`]. Defaults match the
//! live Grok web app; hosts may override individual fields from the
//! environment with [`MonitorConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Origin of the monitored web app
pub const DEFAULT_BASE_URL: &str = "https://grok.com";

/// Path of the rate-limit endpoint, matched as a substring of request URLs
pub const DEFAULT_ENDPOINT_PATH: &str = "/rest/rate-limits";

/// Model discriminator expected in request bodies
pub const DEFAULT_MODEL_NAME: &str = "grok-3";

/// Header that marks a request as self-originated
pub const DEFAULT_MARKER_HEADER: &str = "X-Query-Type";

/// Storage key of the persisted snapshot record
pub const DEFAULT_STORAGE_KEY: &str = "grok-monitor-data";

/// Countdown tick period in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Smallest accepted tick period
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Delay after each warm-up request
pub const DEFAULT_WARM_UP_DELAY_MS: u64 = 1000;

/// Delay between monitor start and the warm-up sequence
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 2000;

/// Periodic autosave interval in seconds
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

/// Smallest non-zero autosave interval
pub const MIN_AUTOSAVE_INTERVAL_SECS: u64 = 5;

/// HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment overrides
pub const ENV_BASE_URL: &str = "GROK_MONITOR_BASE_URL";
pub const ENV_MODEL: &str = "GROK_MONITOR_MODEL";
pub const ENV_COOKIE: &str = "GROK_MONITOR_COOKIE";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the rate-limit monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Origin the polling client talks to
    pub base_url: String,
    /// Rate-limit endpoint path
    pub endpoint_path: String,
    /// Model name sent by polls and required on observed requests
    pub model_name: String,
    /// Header that tags self-originated requests
    pub marker_header: String,
    /// Key of the persisted snapshot record
    pub storage_key: String,
    /// Countdown tick period (ms)
    pub tick_interval_ms: u64,
    /// Pause after each warm-up request (ms)
    pub warm_up_delay_ms: u64,
    /// Pause before the warm-up sequence (ms)
    pub startup_delay_ms: u64,
    /// Periodic autosave interval (s), 0 disables
    pub autosave_interval_secs: u64,
    /// HTTP request timeout (s)
    pub request_timeout_secs: u64,
    /// Load the previous session's snapshots instead of resetting at startup
    pub resume_previous_session: bool,
    /// Session cookie attached to polling requests
    pub cookie: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            marker_header: DEFAULT_MARKER_HEADER.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            warm_up_delay_ms: DEFAULT_WARM_UP_DELAY_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            resume_previous_session: false,
            cookie: None,
        }
    }
}

impl MonitorConfig {
    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.trim().is_empty() {
                config.model_name = model;
            }
        }
        if let Ok(cookie) = std::env::var(ENV_COOKIE) {
            config.cookie = Some(cookie).filter(|c| !c.is_empty());
        }

        config.validate()
    }

    /// Set the origin
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the session cookie
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie.filter(|c| !c.is_empty());
        self
    }

    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        let autosave_interval_secs = match self.autosave_interval_secs {
            0 => 0,
            secs => secs.max(MIN_AUTOSAVE_INTERVAL_SECS),
        };

        Self {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            endpoint_path: if self.endpoint_path.starts_with('/') {
                self.endpoint_path.clone()
            } else {
                format!("/{}", self.endpoint_path)
            },
            tick_interval_ms: self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS),
            autosave_interval_secs,
            request_timeout_secs: self.request_timeout_secs.max(1),
            ..self.clone()
        }
    }

    /// Full URL of the rate-limit endpoint
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoint_path)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn warm_up_delay(&self) -> Duration {
        Duration::from_millis(self.warm_up_delay_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Autosave period, `None` when disabled
    pub fn autosave_interval(&self) -> Option<Duration> {
        match self.autosave_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.endpoint_url(), "https://grok.com/rest/rate-limits");
        assert_eq!(config.model_name, "grok-3");
        assert_eq!(config.marker_header, "X-Query-Type");
        assert_eq!(config.storage_key, "grok-monitor-data");
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.warm_up_delay(), Duration::from_secs(1));
        assert_eq!(config.startup_delay(), Duration::from_secs(2));
        assert_eq!(config.autosave_interval(), Some(Duration::from_secs(30)));
        assert!(!config.resume_previous_session);
    }

    #[test]
    fn test_validate_normalizes() {
        let config = MonitorConfig {
            base_url: "http://localhost:8080/".to_string(),
            endpoint_path: "rest/rate-limits".to_string(),
            tick_interval_ms: 5,
            autosave_interval_secs: 1,
            request_timeout_secs: 0,
            ..Default::default()
        };

        let validated = config.validate();
        assert_eq!(validated.endpoint_url(), "http://localhost:8080/rest/rate-limits");
        assert_eq!(validated.tick_interval_ms, MIN_TICK_INTERVAL_MS);
        assert_eq!(validated.autosave_interval_secs, MIN_AUTOSAVE_INTERVAL_SECS);
        assert_eq!(validated.request_timeout_secs, 1);
    }

    #[test]
    fn test_autosave_can_be_disabled() {
        let config = MonitorConfig {
            autosave_interval_secs: 0,
            ..Default::default()
        }
        .validate();
        assert_eq!(config.autosave_interval(), None);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"model_name":"grok-4","cookie":"sso=abc"}"#).unwrap();
        assert_eq!(config.model_name, "grok-4");
        assert_eq!(config.cookie.as_deref(), Some("sso=abc"));
        assert_eq!(config.endpoint_path, DEFAULT_ENDPOINT_PATH);
    }

    #[test]
    fn test_from_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        std::env::set_var(ENV_BASE_URL, "http://127.0.0.1:9000/");
        std::env::set_var(ENV_COOKIE, "");
        let config = MonitorConfig::from_env();
        std::env::remove_var(ENV_BASE_URL);
        std::env::remove_var(ENV_COOKIE);

        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert!(config.cookie.is_none());
    }
}
