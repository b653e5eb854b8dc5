//! Output formatting module
//!
//! Provides table and JSON output formatting for CLI commands, plus the
//! line format used while watching live events.

use serde::Serialize;
use std::fmt::Display;
use tabled::{Table, Tabled};

use colored::{ColoredString, Colorize};
use grok_monitor_core::services::ratelimit::RemainingLevel;
use grok_monitor_core::{format_countdown, MonitorEvent};

/// Output format enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {}. Use 'table' or 'json'", s)),
        }
    }
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Print data in the specified format
pub fn print_output<T>(data: &[T], format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + Tabled,
{
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("No items found.");
            } else {
                let table = Table::new(data).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Print a single item in the specified format
pub fn print_single<T>(data: &T, format: OutputFormat) -> anyhow::Result<()>
where
    T: Serialize + Tabled,
{
    match format {
        OutputFormat::Table => {
            let table = Table::new([data]).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Print a success message (respects quiet mode)
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message.green());
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// Print an info message (respects quiet mode)
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

// ============================================================================
// Live events
// ============================================================================

/// Color a percentage by how much of the window is left
pub fn colorize_level(text: &str, level: RemainingLevel) -> ColoredString {
    match level {
        RemainingLevel::Healthy => text.green(),
        RemainingLevel::Low => text.yellow(),
        RemainingLevel::Critical => text.red(),
    }
}

/// Plain-text line for one monitor event
pub fn event_line(event: &MonitorEvent) -> String {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    match event {
        MonitorEvent::SnapshotChanged {
            category,
            snapshot: Some(snapshot),
        } => {
            let view = snapshot.view();
            format!(
                "[{}] {:<11} {}/{} left ({}%), window {:.1}h",
                stamp,
                category.info().name,
                view.remaining_queries,
                view.total_queries,
                view.remaining_percent,
                view.window_hours
            )
        }
        MonitorEvent::SnapshotChanged {
            category,
            snapshot: None,
        } => format!("[{}] {:<11} no data", stamp, category.info().name),
        MonitorEvent::CountdownTick {
            category,
            remaining_secs: 0,
        } => format!("[{}] {:<11} window reset, refreshing", stamp, category.info().name),
        MonitorEvent::CountdownTick {
            category,
            remaining_secs,
        } => format!(
            "[{}] {:<11} resets in {}",
            stamp,
            category.info().name,
            format_countdown(*remaining_secs)
        ),
        MonitorEvent::CountdownCleared { category } => {
            format!("[{}] {:<11} countdown cleared", stamp, category.info().name)
        }
    }
}

/// Print one monitor event as a line (table) or a JSON object per line (json)
pub fn print_event(event: &MonitorEvent, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            let line = event_line(event);
            match event {
                MonitorEvent::SnapshotChanged {
                    snapshot: Some(snapshot),
                    ..
                } => println!("{}", colorize_level(&line, snapshot.view().level)),
                MonitorEvent::CountdownTick { .. } => println!("{}", line.cyan()),
                _ => println!("{}", line.dimmed()),
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grok_monitor_core::{Category, RateLimitSnapshot};

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("table".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("invalid".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_event_line_countdown() {
        let line = event_line(&MonitorEvent::CountdownTick {
            category: Category::DeepSearch,
            remaining_secs: 3725,
        });
        assert!(line.contains("Deep Search"));
        assert!(line.ends_with("resets in 01:02:05"));
    }

    #[test]
    fn test_event_line_snapshot() {
        let line = event_line(&MonitorEvent::SnapshotChanged {
            category: Category::Reasoning,
            snapshot: Some(RateLimitSnapshot::new(7200, 20, 5)),
        });
        assert!(line.contains("5/20 left (25%)"));
        assert!(line.contains("window 2.0h"));
    }

    #[test]
    fn test_event_line_expiry() {
        let line = event_line(&MonitorEvent::CountdownTick {
            category: Category::Default,
            remaining_secs: 0,
        });
        assert!(line.contains("window reset"));
    }
}
