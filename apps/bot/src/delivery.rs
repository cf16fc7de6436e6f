use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serenity::all::{CreateMessage, Http, MessageId, UserId};
use thiserror::Error;
use tracing::warn;

use crypto::DigestMessage;

/// Outbound side of the digest pipeline.
#[async_trait]
pub trait DigestChannel: Send + Sync {
    async fn send(&self, recipient: u64, text: &str) -> Result<DigestMessage>;

    async fn delete(&self, recipient: u64, message_id: u64) -> Result<()>;
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("digest send to {recipient} failed: {cause}")]
    SendFailed { recipient: u64, cause: anyhow::Error },

    #[error("delete of message {message} for {recipient} failed: {cause}")]
    DeleteFailed {
        recipient: u64,
        message: u64,
        cause: anyhow::Error,
    },
}

/// Whether an old digest is removed before the replacement goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Delete the previous message unconditionally.
    Always,
    /// Delete only a message from an earlier UTC day.
    StaleOnly,
}

#[derive(Clone)]
pub struct Delivery {
    channel: Arc<dyn DigestChannel>,
}

impl Delivery {
    pub fn new(channel: Arc<dyn DigestChannel>) -> Self {
        Self { channel }
    }

    /// Delete-old/send-new. A failed delete never blocks the replacement;
    /// a failed send surfaces and the caller must leave stored state alone.
    pub async fn replace(
        &self,
        recipient: u64,
        previous: Option<&DigestMessage>,
        text: &str,
        policy: CleanupPolicy,
    ) -> Result<DigestMessage, DeliveryError> {
        if let Some(prev) = previous {
            let due = match policy {
                CleanupPolicy::Always => true,
                CleanupPolicy::StaleOnly => !is_same_utc_day(prev.timestamp, Utc::now()),
            };
            if due && let Err(e) = self.delete(recipient, prev.id).await {
                warn!(recipient, message_id = prev.id, error = %e, "could not delete previous digest");
            }
        }

        self.channel
            .send(recipient, text)
            .await
            .map_err(|cause| DeliveryError::SendFailed { recipient, cause })
    }

    /// Unconditional removal of a digest that should no longer exist.
    /// Returns whether the delete went through, so the caller knows whether
    /// to drop its stored reference.
    pub async fn retract(&self, recipient: u64, message_id: u64) -> bool {
        match self.delete(recipient, message_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(recipient, message_id, error = %e, "could not retract digest");
                false
            }
        }
    }

    async fn delete(&self, recipient: u64, message: u64) -> Result<(), DeliveryError> {
        self.channel
            .delete(recipient, message)
            .await
            .map_err(|cause| DeliveryError::DeleteFailed {
                recipient,
                message,
                cause,
            })
    }
}

pub fn is_same_utc_day(timestamp: i64, now: DateTime<Utc>) -> bool {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(then) => then.date_naive() == now.date_naive(),
        _ => false,
    }
}

/// DM transport over the Discord REST API.
pub struct DiscordChannel {
    http: Arc<Http>,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DigestChannel for DiscordChannel {
    async fn send(&self, recipient: u64, text: &str) -> Result<DigestMessage> {
        let dm = UserId::new(recipient).create_dm_channel(&self.http).await?;
        let message = dm
            .id
            .send_message(&self.http, CreateMessage::new().content(text))
            .await?;

        Ok(DigestMessage {
            id: message.id.get(),
            timestamp: message.timestamp.unix_timestamp(),
        })
    }

    async fn delete(&self, recipient: u64, message_id: u64) -> Result<()> {
        let dm = UserId::new(recipient).create_dm_channel(&self.http).await?;
        dm.id
            .delete_message(&self.http, MessageId::new(message_id))
            .await?;
        Ok(())
    }
}
