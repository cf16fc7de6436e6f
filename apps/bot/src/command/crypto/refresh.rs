use tracing::{info, warn};

use crate::broadcast::RefreshOutcome;
use crate::{Context, Error};

#[poise::command(slash_command)]
pub async fn refresh(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let user_id = ctx.author().id.get();
    info!(user_id, "manual refresh invoked");

    match ctx.data().broadcaster.trigger_refresh(user_id).await {
        Ok(RefreshOutcome::Delivered) => {
            ctx.say("Digest refreshed.").await?;
        }
        Ok(RefreshOutcome::Busy) => {
            ctx.say("A refresh is already running; try again shortly.")
                .await?;
        }
        Ok(RefreshOutcome::NothingToSend) => {
            ctx.say("Nothing to send. Add symbols with `/crypto add`.")
                .await?;
        }
        Err(e) => {
            warn!(user_id, error = %e, "manual refresh failed");
            ctx.say("Refresh failed; try again later.").await?;
        }
    }

    Ok(())
}
