use crypto::SubscriberPatch;
use tracing::{info, warn};

use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Coin symbol(s), comma-separated (e.g., BTC,ETH)"] symbol: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    let store = &ctx.data().store;

    info!(user_id, raw_input = %symbol, "add invoked");

    let requested: Vec<String> = symbol
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if requested.is_empty() {
        warn!(user_id, raw_input = %symbol, "no valid symbols");
        ctx.say("No valid symbols provided.").await?;
        return Ok(());
    }

    let catalog = store.allowed_symbols().await?;
    let unknown: Vec<String> = requested
        .iter()
        .filter(|s| !catalog.contains(s))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        ctx.say(format!(
            "Not supported: {}. Available: {}",
            unknown.join(", "),
            catalog.join(", ")
        ))
        .await?;
        return Ok(());
    }

    let mut watch_list = store
        .get(user_id)
        .await?
        .map(|record| record.watch_list)
        .unwrap_or_default();

    let mut added: Vec<String> = Vec::new();
    let mut already: Vec<String> = Vec::new();

    for sym in requested {
        if watch_list.contains(&sym) {
            already.push(sym);
        } else {
            watch_list.push(sym.clone());
            added.push(sym);
        }
    }

    let display_name = Some(
        ctx.author()
            .global_name
            .clone()
            .unwrap_or_else(|| ctx.author().name.clone()),
    );

    store
        .merge(
            user_id,
            SubscriberPatch {
                display_name,
                watch_list: Some(watch_list),
                ..Default::default()
            },
        )
        .await?;

    info!(
        user_id,
        added_count = added.len(),
        already_count = already.len(),
        "add completed"
    );

    if !added.is_empty() {
        ctx.say(format!("Now watching: {}", added.join(", "))).await?;
    }
    if !already.is_empty() {
        ctx.say(format!("Already watching: {}", already.join(", ")))
            .await?;
    }

    // send the first digest right away rather than waiting for the next tick
    if !added.is_empty()
        && let Err(e) = ctx.data().broadcaster.trigger_refresh(user_id).await
    {
        warn!(user_id, error = %e, "refresh after add failed");
    }

    Ok(())
}
