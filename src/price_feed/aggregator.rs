// src/price_feed/aggregator.rs - Outlier-resistant price aggregation
use std::collections::HashMap;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::constants::*;
use crate::price_feed::types::{AggregatedQuote, FeedError, PriceQuote};

/// Fuses per-provider quotes into one quote per symbol.
///
/// The pipeline is deterministic: a MAD-based outlier filter, a
/// median/mean central estimator, population standard deviation, and a
/// survivor-count confidence score.
#[derive(Debug, Default)]
pub struct PriceAggregator;

impl PriceAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Aggregate all quotes for one symbol.
    pub fn aggregate(
        &self,
        symbol: &str,
        quotes: &[PriceQuote],
    ) -> Result<AggregatedQuote, FeedError> {
        if quotes.is_empty() {
            return Err(FeedError::NoQuotes(symbol.to_string()));
        }
        for quote in quotes {
            if quote.symbol != symbol {
                return Err(FeedError::SymbolMismatch {
                    expected: symbol.to_string(),
                    got: quote.symbol.clone(),
                });
            }
        }

        let survivors = filter_outliers(quotes);
        if survivors.len() < quotes.len() {
            debug!(
                "Dropped {} outlier quote(s) for {}",
                quotes.len() - survivors.len(),
                symbol
            );
        }

        let prices: Vec<BigDecimal> = survivors.iter().map(|q| q.price.clone()).collect();
        let price = central_estimate(&prices);
        let stdev = population_stdev(&prices);
        let confidence = match survivors.len() {
            1 => CONFIDENCE_SINGLE_SOURCE,
            2 => CONFIDENCE_TWO_SOURCES,
            _ => CONFIDENCE_FULL,
        };

        Ok(AggregatedQuote {
            symbol: symbol.to_string(),
            price,
            aggregated_at: Utc::now(),
            confidence,
            stdev,
            source_quotes: survivors,
        })
    }

    /// Aggregate a whole run's quotes, one task per symbol. Symbols that
    /// fail to aggregate are skipped with a warning. Output is sorted by
    /// symbol so batch ordering is stable.
    pub async fn aggregate_all(
        &self,
        quotes_by_symbol: HashMap<String, Vec<PriceQuote>>,
    ) -> Vec<AggregatedQuote> {
        let tasks = quotes_by_symbol.into_iter().map(|(symbol, quotes)| async move {
            let aggregator = PriceAggregator::new();
            match aggregator.aggregate(&symbol, &quotes) {
                Ok(aggregated) => Some(aggregated),
                Err(e) => {
                    warn!("Skipping {symbol}: {e}");
                    None
                }
            }
        });
        let mut aggregated: Vec<AggregatedQuote> =
            join_all(tasks).await.into_iter().flatten().collect();
        aggregated.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        aggregated
    }
}

/// MAD outlier filter. Idempotent: running it on its own output changes
/// nothing.
fn filter_outliers(quotes: &[PriceQuote]) -> Vec<PriceQuote> {
    if quotes.len() < 3 {
        // One quote passes through; two disagreeing quotes are both kept
        // and the confidence score carries the disagreement.
        return quotes.to_vec();
    }

    let prices: Vec<BigDecimal> = quotes.iter().map(|q| q.price.clone()).collect();
    let m = median(&prices);
    let deviations: Vec<BigDecimal> = prices.iter().map(|p| (p - &m).abs()).collect();
    let mad = median(&deviations);

    let n = quotes.len();
    let threshold = if mad < &m * hundredth() {
        // Very tight market: an absolute band avoids dropping everything
        // over micro-deviations.
        &m * tenth()
    } else {
        mad * mad_multiplier(n)
    };

    let survivors: Vec<PriceQuote> = quotes
        .iter()
        .zip(deviations.iter())
        .filter(|(_, dev)| **dev <= threshold)
        .map(|(q, _)| q.clone())
        .collect();

    if survivors.len() < n.div_ceil(2) {
        // The filter ate more than half the sample; distrust it.
        return quotes.to_vec();
    }
    survivors
}

fn mad_multiplier(n: usize) -> BigDecimal {
    if n == 3 {
        // 2.5
        BigDecimal::new(BigInt::from(25), 1)
    } else if n <= 5 {
        BigDecimal::from(3)
    } else {
        BigDecimal::from(2)
    }
}

fn hundredth() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 2)
}

fn tenth() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 1)
}

/// Median of a non-empty sample; even-sized samples average the middle two.
fn median(values: &[BigDecimal]) -> BigDecimal {
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (&sorted[mid - 1] + &sorted[mid]) / BigDecimal::from(2)
    } else {
        sorted[mid].clone()
    }
}

/// Central price estimate: the price itself, the mean of two, or the
/// median of three or more.
fn central_estimate(prices: &[BigDecimal]) -> BigDecimal {
    match prices.len() {
        1 => prices[0].clone(),
        2 => (&prices[0] + &prices[1]) / BigDecimal::from(2),
        _ => median(prices),
    }
}

/// Population standard deviation, reported as a plain float.
fn population_stdev(prices: &[BigDecimal]) -> Option<f64> {
    if prices.len() < 2 {
        return Some(0.0);
    }
    let values: Vec<f64> = prices.iter().filter_map(|p| p.to_f64()).collect();
    if values.len() != prices.len() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::FromPrimitive;
    use std::str::FromStr;

    fn quote(symbol: &str, price: &str, provider: &str) -> PriceQuote {
        PriceQuote::new(symbol, BigDecimal::from_str(price).unwrap(), provider)
    }

    fn btc_quotes(prices: &[&str]) -> Vec<PriceQuote> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| quote("BTCUSDT", p, &format!("provider-{i}")))
            .collect()
    }

    #[test]
    fn single_quote_returns_confidence_60() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate("BTCUSDT", &btc_quotes(&["50000"]))
            .unwrap();
        assert_eq!(result.price, BigDecimal::from(50000));
        assert_eq!(result.confidence, 60);
        assert_eq!(result.stdev, Some(0.0));
        assert_eq!(result.source_quotes.len(), 1);
    }

    #[test]
    fn two_quotes_return_mean_and_confidence_80() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate("NEOUSDT", &[
                quote("NEOUSDT", "10.00", "a"),
                quote("NEOUSDT", "10.10", "b"),
            ])
            .unwrap();
        assert_eq!(result.price, BigDecimal::from_str("10.05").unwrap());
        assert_eq!(result.confidence, 80);
    }

    #[test]
    fn two_wildly_disagreeing_quotes_are_both_kept() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate("BTCUSDT", &btc_quotes(&["100", "900"]))
            .unwrap();
        assert_eq!(result.source_quotes.len(), 2);
        assert_eq!(result.price, BigDecimal::from(500));
        assert_eq!(result.confidence, 80);
    }

    #[test]
    fn three_tight_quotes_return_median_and_confidence_100() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate("BTCUSDT", &btc_quotes(&["50000.00", "50000.50", "50001.00"]))
            .unwrap();
        assert_eq!(result.price, BigDecimal::from_str("50000.50").unwrap());
        assert_eq!(result.confidence, 100);
    }

    #[test]
    fn far_outlier_is_dropped_under_mad() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate(
                "ETHUSDT",
                &[
                    quote("ETHUSDT", "4000", "a"),
                    quote("ETHUSDT", "4000.5", "b"),
                    quote("ETHUSDT", "4000.2", "c"),
                    quote("ETHUSDT", "4500", "d"),
                ],
            )
            .unwrap();
        assert_eq!(result.price, BigDecimal::from_str("4000.2").unwrap());
        assert_eq!(result.confidence, 100);
        assert_eq!(result.source_quotes.len(), 3);
        assert!(!result
            .source_quotes
            .iter()
            .any(|q| q.price == BigDecimal::from(4500)));
    }

    #[test]
    fn four_survivors_take_mean_of_middle_two() {
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate("GASUSDT", &btc_quotes_named("GASUSDT", &["4", "5", "6", "7"]))
            .unwrap();
        assert_eq!(result.price, BigDecimal::from_str("5.5").unwrap());
        assert_eq!(result.confidence, 100);
    }

    fn btc_quotes_named(symbol: &str, prices: &[&str]) -> Vec<PriceQuote> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| quote(symbol, p, &format!("provider-{i}")))
            .collect()
    }

    #[test]
    fn empty_input_is_an_aggregation_error() {
        let aggregator = PriceAggregator::new();
        assert!(matches!(
            aggregator.aggregate("BTCUSDT", &[]),
            Err(FeedError::NoQuotes(_))
        ));
    }

    #[test]
    fn mismatched_symbol_is_rejected() {
        let aggregator = PriceAggregator::new();
        let result = aggregator.aggregate("BTCUSDT", &[quote("ETHUSDT", "4000", "a")]);
        assert!(matches!(result, Err(FeedError::SymbolMismatch { .. })));
    }

    #[test]
    fn aggregation_is_deterministic_across_input_order() {
        let aggregator = PriceAggregator::new();
        let mut quotes = btc_quotes(&["50000.00", "50000.50", "50001.00", "60000"]);
        let forward = aggregator.aggregate("BTCUSDT", &quotes).unwrap();
        quotes.reverse();
        let backward = aggregator.aggregate("BTCUSDT", &quotes).unwrap();
        assert_eq!(forward.price, backward.price);
        assert_eq!(forward.confidence, backward.confidence);
        assert_eq!(forward.source_quotes.len(), backward.source_quotes.len());
    }

    #[test]
    fn outlier_filter_is_idempotent() {
        let quotes = btc_quotes(&["4000", "4000.5", "4000.2", "4500"]);
        let once = filter_outliers(&quotes);
        let twice = filter_outliers(&once);
        let prices_once: Vec<_> = once.iter().map(|q| q.price.clone()).collect();
        let prices_twice: Vec<_> = twice.iter().map(|q| q.price.clone()).collect();
        assert_eq!(prices_once, prices_twice);
    }

    #[test]
    fn stdev_reflects_dispersion() {
        let aggregator = PriceAggregator::new();
        let tight = aggregator
            .aggregate("BTCUSDT", &btc_quotes(&["100", "100", "100"]))
            .unwrap();
        assert_eq!(tight.stdev, Some(0.0));

        let spread = aggregator
            .aggregate("BTCUSDT", &btc_quotes(&["90", "100", "110"]))
            .unwrap();
        let stdev = spread.stdev.unwrap();
        assert!((stdev - 8.164965).abs() < 1e-3);
    }

    #[tokio::test]
    async fn batch_aggregation_skips_failing_symbols_and_sorts() {
        let aggregator = PriceAggregator::new();
        let mut map = HashMap::new();
        map.insert("NEOUSDT".to_string(), vec![quote("NEOUSDT", "10", "a")]);
        map.insert("BTCUSDT".to_string(), vec![quote("BTCUSDT", "50000", "a")]);
        // Mismatched entry fails aggregation and is skipped.
        map.insert("ETHUSDT".to_string(), vec![quote("BTCUSDT", "4000", "a")]);

        let results = aggregator.aggregate_all(map).await;
        let symbols: Vec<_> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "NEOUSDT"]);
    }

    #[test]
    fn tight_market_uses_absolute_band() {
        // All quotes within a hair of each other: MAD is tiny, the band
        // keeps everyone.
        let aggregator = PriceAggregator::new();
        let result = aggregator
            .aggregate(
                "BTCUSDT",
                &btc_quotes(&["50000.00", "50000.01", "50000.02", "50000.03"]),
            )
            .unwrap();
        assert_eq!(result.source_quotes.len(), 4);
        assert_eq!(result.confidence, 100);
        let expected = BigDecimal::from_f64(50000.015).unwrap();
        assert!((result.price - expected).abs() < BigDecimal::from_str("0.001").unwrap());
    }
}
