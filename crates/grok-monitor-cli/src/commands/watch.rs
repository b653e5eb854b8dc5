//! Watch command
//!
//! Runs the monitor in the foreground: warm-up polls, countdowns and
//! expiry re-polls, printing every event until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use grok_monitor_core::{MonitorEvent, RateLimitMonitor, ReqwestTransport};
use tokio::sync::mpsc;

use super::Context;
use crate::output::{print_event, print_info};

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Start from the stored snapshots instead of clearing them
    #[arg(long)]
    pub resume: bool,

    /// Seconds to wait before the warm-up polls
    #[arg(long)]
    pub startup_delay: Option<u64>,

    /// Hide countdown ticks, print snapshot changes only
    #[arg(long)]
    pub no_ticks: bool,
}

/// Whether `event` should be printed under `args`
fn should_print(args: &WatchArgs, event: &MonitorEvent) -> bool {
    match event {
        MonitorEvent::CountdownTick { remaining_secs, .. } => !args.no_ticks || *remaining_secs == 0,
        _ => true,
    }
}

pub async fn execute(ctx: &Context, args: WatchArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    config.resume_previous_session = args.resume;
    if let Some(secs) = args.startup_delay {
        config.startup_delay_ms = secs * 1000;
    }

    let store = ctx.open_store().await?;
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let monitor = RateLimitMonitor::start(config, store, transport, Arc::new(events_tx)).await?;
    print_info(
        &format!(
            "Watching {} (Ctrl-C to stop)",
            monitor.config().endpoint_url()
        ),
        ctx.quiet,
    );

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if should_print(&args, &event) {
                    print_event(&event, ctx.format)?;
                }
            }
            signal = &mut interrupted => {
                if let Err(e) = signal {
                    log::warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
        }
    }

    monitor.shutdown().await;
    print_info("Stopped.", ctx.quiet);
    Ok(())
}
