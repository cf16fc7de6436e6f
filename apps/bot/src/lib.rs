use std::sync::Arc;

use crypto::SubscriberStore;

use crate::broadcast::Broadcaster;

pub mod broadcast;
pub mod command;
pub mod config;
pub mod delivery;

pub struct Data {
    pub store: Arc<dyn SubscriberStore>,
    pub broadcaster: Arc<Broadcaster>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
