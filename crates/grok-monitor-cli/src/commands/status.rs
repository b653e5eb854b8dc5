//! Status command
//!
//! Shows the persisted snapshot for every category.

use anyhow::Result;
use grok_monitor_core::{format_countdown, Category, RateLimitSnapshot, StateManager};
use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::output::{print_info, print_output};

/// Status row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct StatusRow {
    #[tabled(rename = "Category")]
    pub category: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Left %")]
    pub remaining_percent: String,
    #[tabled(rename = "Window")]
    pub window: String,
    #[tabled(rename = "Wait")]
    pub wait: String,
    #[tabled(skip)]
    pub snapshot: Option<RateLimitSnapshot>,
}

impl StatusRow {
    pub fn new(category: Category, snapshot: Option<&RateLimitSnapshot>) -> Self {
        let name = category.info().name.to_string();
        let Some(snapshot) = snapshot else {
            return Self {
                category: category.code().to_string(),
                name,
                used: "-".to_string(),
                remaining: "-".to_string(),
                remaining_percent: "-".to_string(),
                window: "-".to_string(),
                wait: "-".to_string(),
                snapshot: None,
            };
        };

        let view = snapshot.view();
        Self {
            category: category.code().to_string(),
            name,
            used: view.queries_used.to_string(),
            remaining: format!("{}/{}", view.remaining_queries, view.total_queries),
            remaining_percent: format!("{}%", view.remaining_percent),
            window: format!("{:.1}h", view.window_hours),
            wait: snapshot
                .countdown_seconds()
                .map(format_countdown)
                .unwrap_or_else(|| "-".to_string()),
            snapshot: Some(snapshot.clone()),
        }
    }
}

pub async fn execute(ctx: &Context) -> Result<()> {
    let store = ctx.open_store().await?;
    let state = StateManager::builder(store).build();
    let restored = state.restore().await;

    let snapshots = state.snapshots().await;
    let rows: Vec<StatusRow> = Category::ALL
        .into_iter()
        .map(|category| StatusRow::new(category, snapshots.get(&category)))
        .collect();

    print_output(&rows, ctx.format)?;
    if restored == 0 {
        print_info("No snapshots stored yet. Run `grok-monitor watch` or `grok-monitor refresh <category>`.", ctx.quiet);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_row_with_snapshot() {
        let snapshot = RateLimitSnapshot::new(10800, 20, 0).with_wait_time(5);
        let row = StatusRow::new(Category::Default, Some(&snapshot));

        assert_eq!(row.used, "20");
        assert_eq!(row.remaining, "0/20");
        assert_eq!(row.remaining_percent, "0%");
        assert_eq!(row.window, "3.0h");
        assert_eq!(row.wait, "00:00:05");
    }

    #[test]
    fn test_status_row_without_snapshot() {
        let row = StatusRow::new(Category::DeepSearch, None);
        assert_eq!(row.name, "Deep Search");
        assert_eq!(row.remaining, "-");
        assert!(row.snapshot.is_none());
    }
}
