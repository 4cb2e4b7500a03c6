// Scenario tests for the aggregation stage
use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use neofeed_oracle::price_feed::types::PriceQuote;
use neofeed_oracle::price_feed::{scale_price, PriceAggregator};

fn quote(symbol: &str, price: &str, provider: &str) -> PriceQuote {
    PriceQuote::new(symbol, BigDecimal::from_str(price).unwrap(), provider)
}

#[test]
fn outlier_rejection_scenario() {
    // Four providers, one of them far off: the outlier is dropped and the
    // median of the rest goes on-chain.
    let aggregator = PriceAggregator::new();
    let quotes = vec![
        quote("ETHUSDT", "4000", "Binance"),
        quote("ETHUSDT", "4000.5", "CoinGecko"),
        quote("ETHUSDT", "4000.2", "Kraken"),
        quote("ETHUSDT", "4500", "OKX"),
    ];
    let result = aggregator.aggregate("ETHUSDT", &quotes).unwrap();
    assert_eq!(result.price, BigDecimal::from_str("4000.2").unwrap());
    assert_eq!(result.confidence, 100);
    assert_eq!(scale_price(&result.price), 400_020_000_000);
}

#[test]
fn happy_path_scenario_scales_the_median() {
    let aggregator = PriceAggregator::new();
    let quotes = vec![
        quote("BTCUSDT", "50000.00", "Binance"),
        quote("BTCUSDT", "50000.50", "CoinGecko"),
        quote("BTCUSDT", "50001.00", "Kraken"),
    ];
    let result = aggregator.aggregate("BTCUSDT", &quotes).unwrap();
    assert_eq!(scale_price(&result.price), 5_000_050_000_000);
    assert_eq!(result.confidence, 100);
}

#[test]
fn aggregation_is_a_pure_function_of_the_quote_multiset() {
    let aggregator = PriceAggregator::new();
    let quotes = vec![
        quote("NEOUSDT", "10.00", "a"),
        quote("NEOUSDT", "10.10", "b"),
        quote("NEOUSDT", "10.05", "c"),
    ];
    let mut shuffled = quotes.clone();
    shuffled.rotate_left(1);

    let first = aggregator.aggregate("NEOUSDT", &quotes).unwrap();
    let second = aggregator.aggregate("NEOUSDT", &shuffled).unwrap();
    assert_eq!(first.price, second.price);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.stdev, second.stdev);
}

#[tokio::test]
async fn cross_symbol_aggregation_tolerates_per_symbol_failures() {
    let aggregator = PriceAggregator::new();
    let mut by_symbol = HashMap::new();
    by_symbol.insert(
        "BTCUSDT".to_string(),
        vec![quote("BTCUSDT", "50000", "Binance")],
    );
    // Wrong-symbol quotes make this entry unaggregatable.
    by_symbol.insert(
        "ETHUSDT".to_string(),
        vec![quote("NEOUSDT", "10", "Binance")],
    );

    let results = aggregator.aggregate_all(by_symbol).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].symbol, "BTCUSDT");
    assert_eq!(results[0].confidence, 60);
}
