//! Reset command

use anyhow::Result;
use grok_monitor_core::StateManager;

use super::Context;
use crate::output::print_success;

pub async fn execute(ctx: &Context) -> Result<()> {
    let store = ctx.open_store().await?;
    StateManager::builder(store).build().reset().await;

    print_success("Stored rate limit data erased.", ctx.quiet);
    Ok(())
}
