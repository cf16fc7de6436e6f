use crypto::SubscriberPatch;
use tracing::{info, warn};

use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Coin symbol to remove (e.g., BTC)"] symbol: String,
) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    let store = &ctx.data().store;
    let sym = symbol.trim().to_uppercase();

    info!(user_id, symbol = %sym, "remove invoked");

    let Some(record) = store.get(user_id).await? else {
        ctx.say("You are not watching anything yet.").await?;
        return Ok(());
    };

    if !record.watch_list.contains(&sym) {
        ctx.say(format!("{sym} is not in your list.")).await?;
        return Ok(());
    }

    let remaining: Vec<String> = record
        .watch_list
        .iter()
        .filter(|s| *s != &sym)
        .cloned()
        .collect();

    store
        .merge(
            user_id,
            SubscriberPatch {
                watch_list: Some(remaining.clone()),
                ..Default::default()
            },
        )
        .await?;

    ctx.say(format!("{sym} removed from your list.")).await?;

    // an emptied watch list keeps no digest behind
    if remaining.is_empty()
        && let Err(e) = ctx.data().broadcaster.retire_digest(user_id).await
    {
        warn!(user_id, error = %e, "could not retire digest");
    }

    Ok(())
}
