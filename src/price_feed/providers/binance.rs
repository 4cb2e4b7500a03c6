// src/price_feed/providers/binance.rs - Binance API integration
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{http_client, parse_price, parse_volume, sanitize_symbol};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

/// Binance API 24hr ticker response
#[derive(Debug, Deserialize)]
struct BinanceTicker {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    volume: String,
}

/// Binance provider. Treated as an explicit-key adapter: only enabled when
/// an API key is configured.
pub struct BinanceProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
    api_key: Option<String>,
}

impl BinanceProvider {
    pub fn new(
        catalog: Arc<SymbolCatalog>,
        policy: ResiliencePolicy,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            client: http_client(timeout)?,
            catalog,
            policy,
            api_key,
        })
    }

    async fn fetch_ticker(&self, canonical: &str, native: &str) -> Result<PriceQuote, FeedError> {
        let url = format!(
            "{}/ticker/24hr?symbol={}",
            BINANCE_API_BASE,
            sanitize_symbol(native)
        );

        let ticker: BinanceTicker = self
            .policy
            .execute(|| async {
                let mut request = self.client.get(&url);
                if let Some(ref key) = self.api_key {
                    request = request.header("X-MBX-APIKEY", key);
                }
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_BINANCE.into(),
                        status: response.status().as_u16(),
                    });
                }
                response.json().await.map_err(|e| {
                    FeedError::MalformedPayload(format!("Binance response: {e}"))
                })
            })
            .await?;

        let price = parse_price(&ticker.last_price, PROVIDER_BINANCE)?;
        let mut quote = PriceQuote::new(canonical, price, PROVIDER_BINANCE)
            .with_volume(parse_volume(&ticker.volume));
        quote.observed_at = Utc::now();
        quote
            .metadata
            .insert("source_symbol".into(), ticker.symbol);
        Ok(quote)
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        PROVIDER_BINANCE
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let native = self
            .catalog
            .source_symbol(symbol, PROVIDER_BINANCE)
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_BINANCE.to_string(),
            })?
            .to_string();
        self.fetch_ticker(symbol, &native).await
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            if !self.catalog.is_supported(symbol, PROVIDER_BINANCE) {
                debug!("Binance does not support {symbol}, skipping");
                continue;
            }
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("Binance fetch failed for {symbol}: {e}"),
            }
        }
        quotes
    }
}
