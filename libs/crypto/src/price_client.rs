use std::fmt;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::MarketError;

/// How far back to look for the baseline daily close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryWindow {
    Days(u32),
    /// Deepest history the venue will serve in a single request.
    MaxAvailable,
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryWindow::Days(days) => write!(f, "{days}d"),
            HistoryWindow::MaxAvailable => write!(f, "all-time"),
        }
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, MarketError>;

    /// The venue's own 24h change statistic, in percent.
    async fn change_percent_24h(&self, symbol: &str) -> Result<f64, MarketError>;

    /// First daily close inside the window, `None` when the venue has no
    /// candles there (young listing).
    async fn earliest_close(
        &self,
        symbol: &str,
        window: HistoryWindow,
    ) -> Result<Option<f64>, MarketError>;
}

const DEFAULT_BASE_API: &str = "https://api.binance.com/api/v3";
const MAX_DAILY_CANDLES: usize = 1000;

#[derive(Clone)]
pub struct BinanceSource {
    client: Client,
    base_api: String,
}

impl BinanceSource {
    pub fn new(base_api: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_api: base_api.into(),
        }
    }

    /// Create a new BinanceSource from environment variables.
    /// Reads BINANCE_API_BASE_URL, falling back to the public endpoint.
    pub fn from_env() -> Self {
        let base_api = std::env::var("BINANCE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_API.to_string());
        Self::new(base_api)
    }

    fn pair(symbol: &str) -> String {
        format!("{}USDT", symbol.trim().to_uppercase())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_api.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    async fn current_price(&self, symbol: &str) -> Result<f64, MarketError> {
        let body: TickerPrice = self
            .client
            .get(self.endpoint("ticker/price"))
            .query(&[("symbol", Self::pair(symbol))])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| MarketError::quote_unavailable(symbol, e))?
            .json()
            .await
            .map_err(|e| MarketError::quote_unavailable(symbol, e))?;

        parse_decimal(symbol, &body.price, "price")
    }

    async fn change_percent_24h(&self, symbol: &str) -> Result<f64, MarketError> {
        let body: DayStats = self
            .client
            .get(self.endpoint("ticker/24hr"))
            .query(&[("symbol", Self::pair(symbol))])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| MarketError::quote_unavailable(symbol, e))?
            .json()
            .await
            .map_err(|e| MarketError::quote_unavailable(symbol, e))?;

        parse_decimal(symbol, &body.price_change_percent, "24h change")
    }

    async fn earliest_close(
        &self,
        symbol: &str,
        window: HistoryWindow,
    ) -> Result<Option<f64>, MarketError> {
        let mut query: Vec<(&str, String)> = vec![
            ("symbol", Self::pair(symbol)),
            ("interval", "1d".to_string()),
        ];

        match window {
            HistoryWindow::Days(days) => {
                let start = Utc::now() - Duration::days(i64::from(days));
                query.push(("startTime", start.timestamp_millis().to_string()));
                query.push(("limit", "1".to_string()));
            }
            // Without a start the venue returns the most recent candles,
            // so the first element is the oldest close it will serve.
            HistoryWindow::MaxAvailable => {
                query.push(("limit", MAX_DAILY_CANDLES.to_string()));
            }
        }

        let candles: Vec<Kline> = self
            .client
            .get(self.endpoint("klines"))
            .query(&query)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| MarketError::history_unavailable(symbol, e))?
            .json()
            .await
            .map_err(|e| MarketError::history_unavailable(symbol, e))?;

        let Some(first) = candles.first() else {
            return Ok(None);
        };

        let close = first
            .get(4)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| MarketError::malformed(symbol, "kline close missing"))?;

        parse_decimal(symbol, close, "close").map(Some)
    }
}

fn parse_decimal(symbol: &str, raw: &str, what: &str) -> Result<f64, MarketError> {
    raw.parse::<f64>()
        .map_err(|_| MarketError::malformed(symbol, format!("unparseable {what}: {raw:?}")))
}

//
// Match Binance API JSON
// https://developers.binance.com/docs/binance-spot-api-docs/rest-api
//
#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct DayStats {
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

// Klines arrive as positional arrays; the daily close sits at index 4.
type Kline = Vec<serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_normalizes_and_appends_quote_asset() {
        assert_eq!(BinanceSource::pair(" btc "), "BTCUSDT");
        assert_eq!(BinanceSource::pair("ETH"), "ETHUSDT");
    }

    #[test]
    fn window_labels() {
        assert_eq!(HistoryWindow::Days(30).to_string(), "30d");
        assert_eq!(HistoryWindow::MaxAvailable.to_string(), "all-time");
    }

    #[test]
    fn parse_decimal_rejects_garbage() {
        let err = parse_decimal("BTC", "not-a-number", "price").unwrap_err();
        assert!(matches!(err, MarketError::Malformed { .. }));
        assert_eq!(parse_decimal("BTC", "65000.5", "price").unwrap(), 65000.5);
    }
}
