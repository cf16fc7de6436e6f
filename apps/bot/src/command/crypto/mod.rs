mod add;
mod list;
mod refresh;
mod remove;

use crate::{Context, Error};
use add::add;
use list::list;
use refresh::refresh;
use remove::remove;

#[poise::command(
    slash_command,
    rename = "crypto",
    subcommands("add", "remove", "list", "refresh")
)]
pub async fn crypto_command(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}
