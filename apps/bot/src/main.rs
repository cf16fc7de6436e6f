use std::sync::Arc;

use anyhow::Result;
use bot::{
    Data,
    broadcast::{BroadcastScheduler, Broadcaster},
    command::crypto::crypto_command,
    config::Config,
    delivery::{Delivery, DiscordChannel},
};
use crypto::{BinanceSource, PriceSource, RedisSubscriberStore, SubscriberStore};
use poise::{Framework, FrameworkOptions};
use serenity::all::{ActivityData, ClientBuilder, GatewayIntents, Http};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let store: Arc<dyn SubscriberStore> = Arc::new(
        RedisSubscriberStore::from_env()
            .await
            .expect("init subscriber store failed"),
    );
    let source: Arc<dyn PriceSource> = Arc::new(BinanceSource::from_env());

    // Standalone REST client so digests go out independently of the gateway.
    let http = Arc::new(Http::new(&config.discord_token));
    let delivery = Delivery::new(Arc::new(DiscordChannel::new(http)));

    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&store),
        source,
        delivery,
        config.cycle_timeout,
    ));
    let scheduler = Arc::new(BroadcastScheduler::new(Arc::clone(&broadcaster)));

    let intents = GatewayIntents::non_privileged();
    let commands = vec![crypto_command()];

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands,
            ..Default::default()
        })
        .setup({
            let store = Arc::clone(&store);
            let broadcaster = Arc::clone(&broadcaster);
            let config = config.clone();

            move |ctx, ready, framework| {
                Box::pin(async move {
                    info!(
                        "{} [{}] connected successfully!",
                        ready.user.name, ready.user.id
                    );

                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    ctx.set_activity(Some(ActivityData::watching(format!(
                        "prices - {}",
                        config.version
                    ))));

                    Ok(Data { store, broadcaster })
                })
            }
        })
        .build();

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .expect("Err creating client");

    // The first tick fires immediately, re-sending digests to existing
    // subscribers before the regular cadence takes over.
    scheduler.start(config.refresh_interval).await;

    tokio::spawn(async move {
        if let Err(why) = client.start().await {
            error!("Client error: {why:?}");
        }
    });

    shutdown_signal().await;
    scheduler.stop().await;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
