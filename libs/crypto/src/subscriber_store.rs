use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use fred::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Catalog seeded on first initialization when the key is absent.
pub const DEFAULT_SYMBOLS: [&str; 7] = ["BTC", "ETH", "BNB", "XRP", "ADA", "DOGE", "SOL"];

/// Handle to the most recently delivered digest. Present iff a digest was
/// delivered and is not known deleted; id and timestamp travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMessage {
    pub id: u64,
    /// Server-reported delivery time, seconds since epoch.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub subscriber_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub watch_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<DigestMessage>,
}

impl SubscriberRecord {
    pub fn new(subscriber_id: u64) -> Self {
        Self {
            subscriber_id,
            display_name: None,
            watch_list: Vec::new(),
            last_message: None,
        }
    }

    /// Shallow-merge: only fields the patch touches change.
    pub fn apply(&mut self, patch: SubscriberPatch) {
        if let Some(name) = patch.display_name {
            self.display_name = Some(name);
        }
        if let Some(list) = patch.watch_list {
            self.watch_list = list;
        }
        if let Some(message) = patch.last_message {
            self.last_message = message;
        }
    }
}

/// Field-level update. The outer `Option` means "touch this field";
/// `last_message: Some(None)` clears the stored reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriberPatch {
    pub display_name: Option<String>,
    pub watch_list: Option<Vec<String>>,
    pub last_message: Option<Option<DigestMessage>>,
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get(&self, subscriber_id: u64) -> Result<Option<SubscriberRecord>>;

    async fn get_all(&self) -> Result<Vec<SubscriberRecord>>;

    /// Creates a record with an empty watch list when absent, otherwise
    /// re-reads the record and merges only the patched fields.
    async fn merge(&self, subscriber_id: u64, patch: SubscriberPatch) -> Result<()>;

    async fn delete(&self, subscriber_id: u64) -> Result<()>;

    async fn allowed_symbols(&self) -> Result<Vec<String>>;

    /// Returns true if it was newly added
    async fn add_allowed_symbol(&self, symbol: &str) -> Result<bool>;

    /// Returns true if it existed
    async fn remove_allowed_symbol(&self, symbol: &str) -> Result<bool>;
}

pub struct RedisSubscriberStore {
    client: Client,
    key_prefix: String,
}

impl RedisSubscriberStore {
    pub async fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!("{:?}: Redis connection error: {:?}", server, error);
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        let store = Self {
            client,
            key_prefix: key_prefix.into(),
        };
        store.seed_catalog().await?;

        Ok(store)
    }

    /// Create a new RedisSubscriberStore from environment variables.
    /// Expects REDIS_URL and REDIS_KEY_PREFIX to be set.
    pub async fn from_env() -> Result<Self> {
        use std::env;

        let redis_url = env::var("REDIS_URL")
            .map_err(|_| Error::msg("REDIS_URL environment variable not set"))?;
        let key_prefix = env::var("REDIS_KEY_PREFIX")
            .map_err(|_| Error::msg("REDIS_KEY_PREFIX environment variable not set"))?;

        Self::new(&redis_url, key_prefix).await
    }

    fn normalize(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    fn user_key(&self, subscriber_id: u64) -> String {
        format!("{}:user:{}", self.key_prefix, subscriber_id)
    }

    fn users_key(&self) -> String {
        format!("{}:users", self.key_prefix)
    }

    fn catalog_key(&self) -> String {
        format!("{}:symbols", self.key_prefix)
    }

    async fn seed_catalog(&self) -> Result<()> {
        let exists: i64 = self.client.exists(self.catalog_key()).await?;
        if exists == 0 {
            let defaults: Vec<String> = DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();
            let _: i64 = self.client.sadd(self.catalog_key(), defaults).await?;
        }
        Ok(())
    }

    async fn read(&self, subscriber_id: u64) -> Result<Option<SubscriberRecord>> {
        let raw: Option<String> = self.client.get(self.user_key(subscriber_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SubscriberStore for RedisSubscriberStore {
    async fn get(&self, subscriber_id: u64) -> Result<Option<SubscriberRecord>> {
        self.read(subscriber_id).await
    }

    async fn get_all(&self) -> Result<Vec<SubscriberRecord>> {
        let ids: Vec<String> = self.client.smembers(self.users_key()).await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(id) = id.parse::<u64>() else { continue };
            if let Some(record) = self.read(id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn merge(&self, subscriber_id: u64, patch: SubscriberPatch) -> Result<()> {
        // Re-read right before the write to keep the lost-update window small.
        let mut record = self
            .read(subscriber_id)
            .await?
            .unwrap_or_else(|| SubscriberRecord::new(subscriber_id));
        record.apply(patch);

        let json = serde_json::to_string(&record)?;
        let _: () = self
            .client
            .set(self.user_key(subscriber_id), json, None, None, false)
            .await?;
        let _: i64 = self
            .client
            .sadd(self.users_key(), subscriber_id.to_string())
            .await?;
        Ok(())
    }

    async fn delete(&self, subscriber_id: u64) -> Result<()> {
        let _: i64 = self.client.del(self.user_key(subscriber_id)).await?;
        let _: i64 = self
            .client
            .srem(self.users_key(), subscriber_id.to_string())
            .await?;
        Ok(())
    }

    async fn allowed_symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.client.smembers(self.catalog_key()).await?;
        symbols.sort();
        Ok(symbols)
    }

    async fn add_allowed_symbol(&self, symbol: &str) -> Result<bool> {
        let added: i64 = self
            .client
            .sadd(self.catalog_key(), Self::normalize(symbol))
            .await?;
        Ok(added == 1)
    }

    async fn remove_allowed_symbol(&self, symbol: &str) -> Result<bool> {
        let removed: i64 = self
            .client
            .srem(self.catalog_key(), Self::normalize(symbol))
            .await?;
        Ok(removed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(watch_list: &[&str], last_message: Option<DigestMessage>) -> SubscriberRecord {
        SubscriberRecord {
            subscriber_id: 42,
            display_name: Some("ada".to_string()),
            watch_list: watch_list.iter().map(|s| s.to_string()).collect(),
            last_message,
        }
    }

    #[test]
    fn empty_patch_is_a_noop() {
        let original = record_with(&["BTC", "ETH"], Some(DigestMessage { id: 7, timestamp: 1 }));
        let mut patched = original.clone();

        patched.apply(SubscriberPatch::default());

        assert_eq!(patched, original);
    }

    #[test]
    fn add_then_remove_restores_the_watch_list() {
        let original = record_with(&["BTC"], None);
        let mut record = original.clone();

        let mut grown = record.watch_list.clone();
        grown.push("ETH".to_string());
        record.apply(SubscriberPatch {
            watch_list: Some(grown),
            ..Default::default()
        });
        assert_eq!(record.watch_list, vec!["BTC", "ETH"]);

        let shrunk: Vec<String> = record
            .watch_list
            .iter()
            .filter(|s| s.as_str() != "ETH")
            .cloned()
            .collect();
        record.apply(SubscriberPatch {
            watch_list: Some(shrunk),
            ..Default::default()
        });

        assert_eq!(record, original);
    }

    #[test]
    fn clearing_the_message_reference() {
        let mut record = record_with(&[], Some(DigestMessage { id: 7, timestamp: 1 }));

        record.apply(SubscriberPatch {
            last_message: Some(None),
            ..Default::default()
        });

        assert_eq!(record.last_message, None);
    }

    #[test]
    fn patch_leaves_untouched_fields_alone() {
        let mut record = record_with(&["BTC"], Some(DigestMessage { id: 7, timestamp: 1 }));

        record.apply(SubscriberPatch {
            last_message: Some(Some(DigestMessage { id: 8, timestamp: 2 })),
            ..Default::default()
        });

        assert_eq!(record.watch_list, vec!["BTC"]);
        assert_eq!(record.display_name.as_deref(), Some("ada"));
        assert_eq!(record.last_message, Some(DigestMessage { id: 8, timestamp: 2 }));
    }
}
