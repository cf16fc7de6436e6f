use tracing::info;

use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    let store = &ctx.data().store;

    info!(user_id, "list invoked");

    let watch_list = store
        .get(user_id)
        .await?
        .map(|record| record.watch_list)
        .unwrap_or_default();
    let catalog = store.allowed_symbols().await?;

    if watch_list.is_empty() {
        ctx.say(format!(
            "Your list is empty. Add one with `/crypto add`.\nAvailable: {}",
            catalog.join(", ")
        ))
        .await?;
    } else {
        ctx.say(format!(
            "Watching: {}\nAvailable: {}",
            watch_list.join(", "),
            catalog.join(", ")
        ))
        .await?;
    }

    Ok(())
}
