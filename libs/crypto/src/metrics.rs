use futures::{StreamExt, TryStreamExt, stream};
use tracing::warn;

use crate::error::{MarketError, MetricError};
use crate::price_client::{HistoryWindow, PriceSource};

/// Multi-window snapshot for one symbol, built fresh on every cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMetric {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub change_30d: f64,
    pub change_1y: f64,
    pub change_all_time: f64,
}

/// Derive the percentage deltas for one symbol. The 24h figure is the
/// venue's own statistic and passes through unchanged.
pub fn compute_metrics(
    symbol: &str,
    price: f64,
    change_24h: f64,
    close_30d: Option<f64>,
    close_1y: Option<f64>,
    close_earliest: Option<f64>,
) -> Result<SymbolMetric, MetricError> {
    Ok(SymbolMetric {
        symbol: symbol.to_string(),
        price,
        change_24h,
        change_30d: percent_change(symbol, price, close_30d, HistoryWindow::Days(30))?,
        change_1y: percent_change(symbol, price, close_1y, HistoryWindow::Days(365))?,
        change_all_time: percent_change(symbol, price, close_earliest, HistoryWindow::MaxAvailable)?,
    })
}

fn percent_change(
    symbol: &str,
    price: f64,
    close: Option<f64>,
    window: HistoryWindow,
) -> Result<f64, MetricError> {
    let close = close.ok_or_else(|| MetricError::MissingClose {
        symbol: symbol.to_string(),
        window,
    })?;
    if close == 0.0 {
        return Err(MetricError::ZeroClose {
            symbol: symbol.to_string(),
            window,
        });
    }
    Ok((price - close) / close * 100.0)
}

const SYMBOL_CONCURRENCY: usize = 4;

/// Fetch and aggregate metrics for a whole watch list, preserving its order.
///
/// A symbol that cannot anchor a percentage is logged and dropped; a venue
/// failure aborts the whole collection so the caller can retry next tick.
pub async fn collect_metrics(
    source: &dyn PriceSource,
    symbols: &[String],
) -> Result<Vec<SymbolMetric>, MarketError> {
    let rows: Vec<Option<SymbolMetric>> = stream::iter(symbols.iter().cloned())
        .map(|symbol| async move { fetch_symbol(source, &symbol).await })
        .buffered(SYMBOL_CONCURRENCY)
        .try_collect()
        .await?;

    Ok(rows.into_iter().flatten().collect())
}

async fn fetch_symbol(
    source: &dyn PriceSource,
    symbol: &str,
) -> Result<Option<SymbolMetric>, MarketError> {
    let (price, change_24h) = tokio::try_join!(
        source.current_price(symbol),
        source.change_percent_24h(symbol)
    )?;

    let (close_30d, close_1y, close_earliest) = tokio::try_join!(
        source.earliest_close(symbol, HistoryWindow::Days(30)),
        source.earliest_close(symbol, HistoryWindow::Days(365)),
        source.earliest_close(symbol, HistoryWindow::MaxAvailable)
    )?;

    match compute_metrics(symbol, price, change_24h, close_30d, close_1y, close_earliest) {
        Ok(metric) => Ok(Some(metric)),
        Err(e) => {
            warn!(symbol, error = %e, "symbol skipped for this cycle");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn thirty_day_formula_is_exact() {
        let m = compute_metrics("BTC", 65000.0, 3.0, Some(60000.0), Some(40000.0), Some(10000.0))
            .unwrap();

        assert!((m.change_30d - (65000.0 - 60000.0) / 60000.0 * 100.0).abs() < TOLERANCE);
        assert!((m.change_1y - 62.5).abs() < TOLERANCE);
        assert!((m.change_all_time - 550.0).abs() < TOLERANCE);
        assert_eq!(m.price, 65000.0);
    }

    #[test]
    fn day_change_passes_through_unmodified() {
        let m = compute_metrics("ETH", 3000.0, -4.25, Some(2800.0), Some(2000.0), Some(100.0))
            .unwrap();
        assert_eq!(m.change_24h, -4.25);
    }

    #[test]
    fn missing_close_names_its_window() {
        let err =
            compute_metrics("BTC", 65000.0, 1.0, Some(60000.0), None, Some(100.0)).unwrap_err();
        assert_eq!(
            err,
            MetricError::MissingClose {
                symbol: "BTC".to_string(),
                window: HistoryWindow::Days(365),
            }
        );
    }

    #[test]
    fn zero_close_is_rejected() {
        let err =
            compute_metrics("BTC", 65000.0, 1.0, Some(0.0), Some(40000.0), Some(100.0)).unwrap_err();
        assert_eq!(
            err,
            MetricError::ZeroClose {
                symbol: "BTC".to_string(),
                window: HistoryWindow::Days(30),
            }
        );
    }

    struct FakeQuote {
        price: f64,
        change_24h: f64,
        close: Option<f64>,
    }

    struct FakeSource {
        quotes: HashMap<String, FakeQuote>,
        failing: HashSet<String>,
    }

    impl FakeSource {
        fn new(quotes: Vec<(&str, FakeQuote)>) -> Self {
            Self {
                quotes: quotes
                    .into_iter()
                    .map(|(s, q)| (s.to_string(), q))
                    .collect(),
                failing: HashSet::new(),
            }
        }

        fn failing(mut self, symbol: &str) -> Self {
            self.failing.insert(symbol.to_string());
            self
        }

        fn quote(&self, symbol: &str) -> Result<&FakeQuote, MarketError> {
            if self.failing.contains(symbol) {
                return Err(MarketError::quote_unavailable(symbol, "venue down"));
            }
            self.quotes
                .get(symbol)
                .ok_or_else(|| MarketError::quote_unavailable(symbol, "unknown symbol"))
        }
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn current_price(&self, symbol: &str) -> Result<f64, MarketError> {
            Ok(self.quote(symbol)?.price)
        }

        async fn change_percent_24h(&self, symbol: &str) -> Result<f64, MarketError> {
            Ok(self.quote(symbol)?.change_24h)
        }

        async fn earliest_close(
            &self,
            symbol: &str,
            _window: HistoryWindow,
        ) -> Result<Option<f64>, MarketError> {
            Ok(self.quote(symbol)?.close)
        }
    }

    fn quote(price: f64, close: Option<f64>) -> FakeQuote {
        FakeQuote {
            price,
            change_24h: 1.0,
            close,
        }
    }

    #[tokio::test]
    async fn collection_preserves_watch_list_order() {
        let source = FakeSource::new(vec![
            ("BTC", quote(65000.0, Some(60000.0))),
            ("ETH", quote(3000.0, Some(2500.0))),
            ("SOL", quote(150.0, Some(100.0))),
        ]);
        let symbols = vec!["SOL".to_string(), "BTC".to_string(), "ETH".to_string()];

        let metrics = collect_metrics(&source, &symbols).await.unwrap();

        let order: Vec<&str> = metrics.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, vec!["SOL", "BTC", "ETH"]);
    }

    #[tokio::test]
    async fn symbol_without_history_is_dropped_not_fatal() {
        let source = FakeSource::new(vec![
            ("BTC", quote(65000.0, Some(60000.0))),
            ("NEW", quote(1.0, None)),
        ]);
        let symbols = vec!["BTC".to_string(), "NEW".to_string()];

        let metrics = collect_metrics(&source, &symbols).await.unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].symbol, "BTC");
    }

    #[tokio::test]
    async fn venue_failure_aborts_the_collection() {
        let source = FakeSource::new(vec![("BTC", quote(65000.0, Some(60000.0)))]).failing("BTC");
        let symbols = vec!["BTC".to_string()];

        let err = collect_metrics(&source, &symbols).await.unwrap_err();
        assert!(matches!(err, MarketError::QuoteUnavailable { .. }));
    }
}
