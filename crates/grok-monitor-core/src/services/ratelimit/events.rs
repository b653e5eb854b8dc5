//! Rendering collaborator interface
//!
//! The state manager pushes changes out through a [`Renderer`]. Calls are
//! fire-and-forget: implementations must return immediately, so anything
//! slow belongs behind a channel. An unbounded tokio sender is a ready-made
//! renderer that turns every call into a [`MonitorEvent`].

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::types::{format_countdown, Category, RateLimitSnapshot};

/// Change notification delivered to renderers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A category's snapshot was replaced (or cleared by a reset)
    SnapshotChanged {
        category: Category,
        snapshot: Option<RateLimitSnapshot>,
    },
    /// Seconds left on a running countdown; `0` when it just expired
    CountdownTick {
        category: Category,
        remaining_secs: u64,
    },
    /// A countdown was dropped before expiring
    CountdownCleared { category: Category },
}

impl MonitorEvent {
    pub fn category(&self) -> Category {
        match self {
            MonitorEvent::SnapshotChanged { category, .. }
            | MonitorEvent::CountdownTick { category, .. }
            | MonitorEvent::CountdownCleared { category } => *category,
        }
    }

    /// `HH:MM:SS` text for countdown ticks
    pub fn countdown_text(&self) -> Option<String> {
        match self {
            MonitorEvent::CountdownTick { remaining_secs, .. } => {
                Some(format_countdown(*remaining_secs))
            }
            _ => None,
        }
    }
}

/// Receiver of state changes
pub trait Renderer: Send + Sync {
    fn on_snapshot_changed(&self, category: Category, snapshot: Option<&RateLimitSnapshot>);

    fn on_countdown_tick(&self, category: Category, remaining_secs: u64);

    fn on_countdown_cleared(&self, category: Category);
}

impl Renderer for UnboundedSender<MonitorEvent> {
    fn on_snapshot_changed(&self, category: Category, snapshot: Option<&RateLimitSnapshot>) {
        // A dropped receiver just means nobody is rendering
        let _ = self.send(MonitorEvent::SnapshotChanged {
            category,
            snapshot: snapshot.cloned(),
        });
    }

    fn on_countdown_tick(&self, category: Category, remaining_secs: u64) {
        let _ = self.send(MonitorEvent::CountdownTick {
            category,
            remaining_secs,
        });
    }

    fn on_countdown_cleared(&self, category: Category) {
        let _ = self.send(MonitorEvent::CountdownCleared { category });
    }
}

/// Renderer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn on_snapshot_changed(&self, _category: Category, _snapshot: Option<&RateLimitSnapshot>) {}

    fn on_countdown_tick(&self, _category: Category, _remaining_secs: u64) {}

    fn on_countdown_cleared(&self, _category: Category) {}
}
