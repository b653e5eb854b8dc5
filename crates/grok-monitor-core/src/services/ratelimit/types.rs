//! Rate limit types
//!
//! The category registry and the snapshot observed for each category.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Category Registry
// ============================================================================

/// Usage category whose quota is tracked independently
///
/// The set is closed: anything outside these three codes is rejected at the
/// state boundary.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// General queries (`DEFAULT`)
    #[default]
    Default,
    /// Extended reasoning / "think" queries (`REASONING`)
    Reasoning,
    /// Deep search queries (`DEEPSEARCH`)
    DeepSearch,
}

/// Static display metadata for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Accent color (hex)
    pub color: &'static str,
}

impl Category {
    /// Every category, in warm-up order
    pub const ALL: [Category; 3] = [Category::Default, Category::Reasoning, Category::DeepSearch];

    /// Wire code used in request bodies, marker headers and persisted state
    pub fn code(&self) -> &'static str {
        match self {
            Category::Default => "DEFAULT",
            Category::Reasoning => "REASONING",
            Category::DeepSearch => "DEEPSEARCH",
        }
    }

    /// Look up a category by its exact wire code
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Display metadata
    pub fn info(&self) -> CategoryInfo {
        match self {
            Category::Default => CategoryInfo {
                name: "Default",
                color: "#4CAF50",
            },
            Category::Reasoning => CategoryInfo {
                name: "Reasoning",
                color: "#FFA500",
            },
            Category::DeepSearch => CategoryInfo {
                name: "Deep Search",
                color: "#9C27B0",
            },
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Lenient parsing for humans; protocol code paths use [`Category::from_code`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "general" => Ok(Category::Default),
            "reasoning" | "think" => Ok(Category::Reasoning),
            "deepsearch" | "deep_search" | "deep-search" => Ok(Category::DeepSearch),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

// ============================================================================
// Snapshot Types
// ============================================================================

/// One observation of a category's quota window
///
/// Built only through [`RateLimitSnapshot::from_value`] (or serde on
/// trusted data); never patched after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    /// Length of the rolling quota window
    pub window_size_seconds: u64,
    /// Quota ceiling for the window
    pub total_queries: u64,
    /// Queries left in the window
    pub remaining_queries: u64,
    /// Seconds until the window resets, sent only when exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_seconds: Option<u64>,
}

impl RateLimitSnapshot {
    pub fn new(window_size_seconds: u64, total_queries: u64, remaining_queries: u64) -> Self {
        Self {
            window_size_seconds,
            total_queries,
            remaining_queries,
            wait_time_seconds: None,
        }
    }

    /// Set the wait time
    pub fn with_wait_time(mut self, seconds: u64) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    /// Validate a decoded JSON body
    ///
    /// Returns `None` unless all three required fields are present and hold
    /// non-negative integers. A malformed `waitTimeSeconds` is dropped rather
    /// than failing the whole snapshot.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        Some(Self {
            window_size_seconds: count_field(obj.get("windowSizeSeconds")?)?,
            total_queries: count_field(obj.get("totalQueries")?)?,
            remaining_queries: count_field(obj.get("remainingQueries")?)?,
            wait_time_seconds: obj.get("waitTimeSeconds").and_then(count_field),
        })
    }

    /// Best-effort decode of a raw response body
    pub fn parse(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        Self::from_value(&value)
    }

    /// Wait time that should arm a countdown
    ///
    /// Only meaningful when the quota is exhausted.
    pub fn countdown_seconds(&self) -> Option<u64> {
        if self.remaining_queries == 0 {
            self.wait_time_seconds
        } else {
            None
        }
    }

    /// Derived figures for display
    pub fn view(&self) -> SnapshotView {
        let remaining_percent = if self.total_queries == 0 {
            0
        } else {
            ((self.remaining_queries as f64 / self.total_queries as f64) * 100.0).round() as u32
        };

        SnapshotView {
            queries_used: self.total_queries.saturating_sub(self.remaining_queries),
            total_queries: self.total_queries,
            remaining_queries: self.remaining_queries,
            remaining_percent,
            window_hours: self.window_size_seconds as f64 / 3600.0,
            level: RemainingLevel::from_percent(remaining_percent),
        }
    }
}

/// Accept JSON integers, and floats that carry an integral value
fn count_field(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

/// Snapshot map keyed by category; an absent key means "no data yet"
pub type SnapshotMap = BTreeMap<Category, RateLimitSnapshot>;

// ============================================================================
// Display Helpers
// ============================================================================

/// How much of the window is left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainingLevel {
    /// 50% or more left
    Healthy,
    /// Between 25% and 50% left
    Low,
    /// Under 25% left
    Critical,
}

impl RemainingLevel {
    pub fn from_percent(remaining_percent: u32) -> Self {
        if remaining_percent < 25 {
            RemainingLevel::Critical
        } else if remaining_percent < 50 {
            RemainingLevel::Low
        } else {
            RemainingLevel::Healthy
        }
    }
}

/// Numbers a renderer shows for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotView {
    pub queries_used: u64,
    pub total_queries: u64,
    pub remaining_queries: u64,
    /// Rounded share of the quota still available
    pub remaining_percent: u32,
    pub window_hours: f64,
    pub level: RemainingLevel,
}

/// Format seconds as `HH:MM:SS`
pub fn format_countdown(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

// ============================================================================
// Tests
// ============================================================================
