mod digest;
mod error;
mod metrics;
mod price_client;
mod subscriber_store;

pub use digest::format_digest;
pub use error::{MarketError, MetricError};
pub use metrics::{SymbolMetric, collect_metrics, compute_metrics};
pub use price_client::{BinanceSource, HistoryWindow, PriceSource};
pub use subscriber_store::{
    DEFAULT_SYMBOLS, DigestMessage, RedisSubscriberStore, SubscriberPatch, SubscriberRecord,
    SubscriberStore,
};
