use thiserror::Error;

use crate::price_client::HistoryWindow;

/// Failures talking to the market-data venue. Any of these abort the
/// affected subscriber's refresh for the current tick; the next tick retries.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("quote unavailable for {symbol}")]
    QuoteUnavailable {
        symbol: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("price history unavailable for {symbol}")]
    HistoryUnavailable {
        symbol: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("malformed venue response for {symbol}: {detail}")]
    Malformed { symbol: String, detail: String },
}

impl MarketError {
    pub(crate) fn quote_unavailable(
        symbol: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::QuoteUnavailable {
            symbol: symbol.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn history_unavailable(
        symbol: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::HistoryUnavailable {
            symbol: symbol.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn malformed(symbol: &str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }
}

/// A single symbol whose baseline close cannot anchor a percentage.
/// The symbol is dropped from the digest for this cycle; the rest survive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("no {window} close available for {symbol}")]
    MissingClose { symbol: String, window: HistoryWindow },

    #[error("zero {window} close for {symbol}")]
    ZeroClose { symbol: String, window: HistoryWindow },
}
