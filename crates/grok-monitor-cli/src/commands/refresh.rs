//! Refresh command
//!
//! Polls one category once, with the same marked request the monitor uses,
//! and stores the result next to the other categories.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use grok_monitor_core::{Category, PollingClient, ReqwestTransport, StateManager};

use super::status::StatusRow;
use super::Context;
use crate::output::{print_error, print_info, print_single};

pub async fn execute(ctx: &Context, category: Category) -> Result<()> {
    let store = ctx.open_store().await?;
    let state = StateManager::builder(store).build();
    state.restore().await;

    print_info(
        &format!("Fetching {} rate limits from {}...", category.info().name, ctx.config.endpoint_url()),
        ctx.quiet,
    );

    let transport = Arc::new(ReqwestTransport::new(ctx.config.request_timeout()));
    let poller = PollingClient::new(&ctx.config, transport, Arc::clone(&state));

    let result = poller.fetch_snapshot(category).await;

    // Leave no countdown timer behind
    state.shutdown().await;

    let snapshot = result
        .inspect_err(|e| {
            if e.is_network() {
                print_error("Request failed. Check the network or set GROK_MONITOR_COOKIE.");
            }
        })
        .with_context(|| format!("Failed to refresh {}", category))?;

    print_single(&StatusRow::new(category, Some(&snapshot)), ctx.format)
}
