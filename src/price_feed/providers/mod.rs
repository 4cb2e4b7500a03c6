// src/price_feed/providers/mod.rs - Provider adapter trait and registry
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive, Zero};
use reqwest::Client;

use crate::catalog::SymbolCatalog;
use crate::config::AppConfig;
use crate::constants::*;
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResilienceLayer;

pub mod binance;
pub mod coinbase;
pub mod coingecko;
pub mod coinmarketcap;
pub mod kraken;
pub mod okx;

pub use binance::BinanceProvider;
pub use coinbase::CoinbaseProvider;
pub use coingecko::CoinGeckoProvider;
pub use coinmarketcap::CoinMarketCapProvider;
pub use kraken::KrakenProvider;
pub use okx::OkxProvider;

/// A market-data source. The adapter set is open: anything satisfying this
/// trait can join the registry.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Stable provider name used for catalog lookups, rate limiting and
    /// circuit breaking.
    fn name(&self) -> &'static str;

    /// Whether the adapter has the credentials and endpoints it needs.
    fn is_enabled(&self) -> bool;

    /// Fetch one canonical symbol. Fails with `Unsupported` when the
    /// catalog has no mapping for this provider.
    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError>;

    /// Best-effort batch fetch: unsupported symbols are filtered out,
    /// per-symbol failures are logged and suppressed.
    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote>;
}

/// Build the full adapter registry. Disabled adapters are still listed so
/// the pipeline can report what was skipped and why.
pub fn build_providers(
    config: &AppConfig,
    catalog: Arc<SymbolCatalog>,
    resilience: &ResilienceLayer,
) -> Result<Vec<Arc<dyn PriceProvider>>, FeedError> {
    let timeout = Duration::from_secs(config.provider_timeout_secs);
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(BinanceProvider::new(
            catalog.clone(),
            resilience.policy(PROVIDER_BINANCE),
            config.binance_api_key.clone(),
            timeout,
        )?),
        Arc::new(CoinGeckoProvider::new(
            catalog.clone(),
            resilience.policy(PROVIDER_COINGECKO),
            config.coingecko_api_key.clone(),
            timeout,
        )?),
        Arc::new(CoinMarketCapProvider::new(
            catalog.clone(),
            resilience.policy(PROVIDER_COINMARKETCAP),
            config.coinmarketcap_api_key.clone(),
            timeout,
        )?),
        Arc::new(KrakenProvider::new(
            catalog.clone(),
            resilience.policy(PROVIDER_KRAKEN),
            timeout,
        )?),
        Arc::new(CoinbaseProvider::new(
            catalog.clone(),
            resilience.policy(PROVIDER_COINBASE),
            timeout,
        )?),
        Arc::new(OkxProvider::new(
            catalog,
            resilience.policy(PROVIDER_OKX),
            timeout,
        )?),
    ];
    Ok(providers)
}

/// Shared reqwest client builder for adapters.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, FeedError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(HTTP_USER_AGENT)
        .build()
        .map_err(|e| FeedError::Config(format!("Failed to create HTTP client: {e}")))
}

/// Strip everything non-alphanumeric from a symbol before it is
/// interpolated into a URL path or query string.
pub(crate) fn sanitize_symbol(symbol: &str) -> String {
    symbol.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Quote currency implied by a canonical symbol's suffix.
pub(crate) fn canonical_quote(symbol: &str) -> &'static str {
    let upper = symbol.to_uppercase();
    if upper.ends_with("USDT") {
        "USDT"
    } else if upper.ends_with("BTC") {
        "BTC"
    } else {
        "USD"
    }
}

/// Parse a provider's decimal string into a positive price.
pub(crate) fn parse_price(raw: &str, provider: &str) -> Result<BigDecimal, FeedError> {
    let price = BigDecimal::from_str(raw.trim()).map_err(|e| {
        FeedError::MalformedPayload(format!("{provider}: unparsable price {raw:?}: {e}"))
    })?;
    if price <= BigDecimal::zero() {
        return Err(FeedError::MalformedPayload(format!(
            "{provider}: non-positive price {raw:?}"
        )));
    }
    Ok(price)
}

/// Convert a float price from a JSON payload into a positive BigDecimal.
pub(crate) fn price_from_f64(value: f64, provider: &str) -> Result<BigDecimal, FeedError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(FeedError::MalformedPayload(format!(
            "{provider}: non-positive price {value}"
        )));
    }
    BigDecimal::from_f64(value).ok_or_else(|| {
        FeedError::MalformedPayload(format!("{provider}: unrepresentable price {value}"))
    })
}

/// Parse an optional base-denominated volume; bad values become None
/// rather than failing the quote.
pub(crate) fn parse_volume(raw: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(raw.trim())
        .ok()
        .filter(|v| *v >= BigDecimal::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_symbol("BTC-USDT"), "BTCUSDT");
        assert_eq!(sanitize_symbol("btc/usdt?x=1"), "btcusdtx1");
        assert_eq!(sanitize_symbol("NEOUSDT"), "NEOUSDT");
    }

    #[test]
    fn quote_currency_from_suffix() {
        assert_eq!(canonical_quote("BTCUSDT"), "USDT");
        assert_eq!(canonical_quote("NEOBTC"), "BTC");
        assert_eq!(canonical_quote("XYZUSD"), "USD");
    }

    #[test]
    fn price_parsing_rejects_non_positive() {
        assert!(parse_price("50000.50", "Binance").is_ok());
        assert!(parse_price("0", "Binance").is_err());
        assert!(parse_price("-3", "Binance").is_err());
        assert!(parse_price("nope", "Binance").is_err());
        assert!(price_from_f64(f64::NAN, "CoinGecko").is_err());
        assert!(price_from_f64(4000.2, "CoinGecko").is_ok());
    }

    #[test]
    fn volume_parsing_is_lenient() {
        assert!(parse_volume("123.45").is_some());
        assert!(parse_volume("-1").is_none());
        assert!(parse_volume("n/a").is_none());
    }
}
