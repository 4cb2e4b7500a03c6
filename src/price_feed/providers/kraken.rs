// src/price_feed/providers/kraken.rs - Kraken API integration
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{http_client, parse_price, parse_volume, sanitize_symbol};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

#[derive(Debug, Deserialize)]
struct KrakenReply {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

/// Kraken ticker: `c` is [last trade price, lot volume], `v` is
/// [volume today, volume 24h] in base units.
#[derive(Debug, Deserialize)]
struct KrakenTicker {
    c: Vec<String>,
    #[serde(default)]
    v: Vec<String>,
}

/// Kraken provider. Public endpoints only; always enabled. Uses the native
/// multi-pair Ticker endpoint for batches.
pub struct KrakenProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
}

impl KrakenProvider {
    pub fn new(
        catalog: Arc<SymbolCatalog>,
        policy: ResiliencePolicy,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            client: http_client(timeout)?,
            catalog,
            policy,
        })
    }

    async fn fetch_tickers(
        &self,
        pairs: &[String],
    ) -> Result<HashMap<String, KrakenTicker>, FeedError> {
        let joined = pairs
            .iter()
            .map(|p| sanitize_symbol(p))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/Ticker?pair={}", KRAKEN_API_BASE, joined);

        let reply: KrakenReply = self
            .policy
            .execute(|| async {
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_KRAKEN.into(),
                        status: response.status().as_u16(),
                    });
                }
                response
                    .json()
                    .await
                    .map_err(|e| FeedError::MalformedPayload(format!("Kraken response: {e}")))
            })
            .await?;

        if !reply.error.is_empty() {
            return Err(FeedError::MalformedPayload(format!(
                "Kraken: {}",
                reply.error.join("; ")
            )));
        }
        Ok(reply.result)
    }

    /// Kraken sometimes keys results under classic pair aliases; match the
    /// requested pair exactly first, then by sanitized comparison.
    fn ticker_for<'a>(
        result: &'a HashMap<String, KrakenTicker>,
        pair: &str,
    ) -> Option<&'a KrakenTicker> {
        if let Some(ticker) = result.get(pair) {
            return Some(ticker);
        }
        let wanted = sanitize_symbol(pair);
        result
            .iter()
            .find(|(key, _)| sanitize_symbol(key) == wanted)
            .map(|(_, ticker)| ticker)
    }

    fn quote_from_ticker(
        &self,
        canonical: &str,
        native: &str,
        ticker: &KrakenTicker,
    ) -> Result<PriceQuote, FeedError> {
        let last = ticker.c.first().ok_or_else(|| {
            FeedError::MalformedPayload(format!("Kraken: empty close array for {native}"))
        })?;
        let price = parse_price(last, PROVIDER_KRAKEN)?;
        let volume = ticker.v.get(1).and_then(|v| parse_volume(v));

        let mut quote = PriceQuote::new(canonical, price, PROVIDER_KRAKEN).with_volume(volume);
        quote
            .metadata
            .insert("source_symbol".into(), native.to_string());
        Ok(quote)
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for KrakenProvider {
    fn name(&self) -> &'static str {
        PROVIDER_KRAKEN
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let native = self
            .catalog
            .source_symbol(symbol, PROVIDER_KRAKEN)
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_KRAKEN.to_string(),
            })?
            .to_string();
        let result = self.fetch_tickers(std::slice::from_ref(&native)).await?;
        let ticker = Self::ticker_for(&result, &native).ok_or_else(|| {
            FeedError::MalformedPayload(format!("Kraken: no ticker for {native}"))
        })?;
        self.quote_from_ticker(symbol, &native, ticker)
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let plan: Vec<(String, String)> = symbols
            .iter()
            .filter_map(|symbol| {
                self.catalog
                    .source_symbol(symbol, PROVIDER_KRAKEN)
                    .map(|native| (symbol.clone(), native.to_string()))
            })
            .collect();
        if plan.is_empty() {
            debug!("Kraken supports none of the requested symbols");
            return Vec::new();
        }

        let pairs: Vec<String> = plan.iter().map(|(_, native)| native.clone()).collect();
        let result = match self.fetch_tickers(&pairs).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Kraken batch fetch failed: {e}");
                return Vec::new();
            }
        };

        let mut quotes = Vec::new();
        for (canonical, native) in &plan {
            let Some(ticker) = Self::ticker_for(&result, native) else {
                warn!("Kraken returned no ticker for {native}");
                continue;
            };
            match self.quote_from_ticker(canonical, native, ticker) {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("Kraken quote failed for {canonical}: {e}"),
            }
        }
        quotes
    }
}
