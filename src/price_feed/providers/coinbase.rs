// src/price_feed/providers/coinbase.rs - Coinbase exchange-rates integration
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{canonical_quote, http_client, parse_price, sanitize_symbol};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

#[derive(Debug, Deserialize)]
struct ExchangeRatesReply {
    data: ExchangeRatesData,
}

#[derive(Debug, Deserialize)]
struct ExchangeRatesData {
    currency: String,
    rates: HashMap<String, String>,
}

/// Coinbase provider built on the public exchange-rates endpoint: one call
/// per base currency returns rates against every quote currency, so the
/// price is just a map lookup. No volume data. Always enabled.
pub struct CoinbaseProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
}

impl CoinbaseProvider {
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

    async fn fetch_rates(&self, base: &str) -> Result<ExchangeRatesData, FeedError> {
        let url = format!(
            "{}/exchange-rates?currency={}",
            COINBASE_API_BASE,
            sanitize_symbol(base)
        );

        let reply: ExchangeRatesReply = self
            .policy
            .execute(|| async {
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_COINBASE.into(),
                        status: response.status().as_u16(),
                    });
                }
                response
                    .json()
                    .await
                    .map_err(|e| FeedError::MalformedPayload(format!("Coinbase response: {e}")))
            })
            .await?;
        Ok(reply.data)
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for CoinbaseProvider {
    fn name(&self) -> &'static str {
        PROVIDER_COINBASE
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let base = self
            .catalog
            .source_symbol(symbol, PROVIDER_COINBASE)
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_COINBASE.to_string(),
            })?
            .to_string();

        let rates = self.fetch_rates(&base).await?;
        let quote_currency = canonical_quote(symbol);
        let rate = rates.rates.get(quote_currency).ok_or_else(|| {
            FeedError::MalformedPayload(format!(
                "Coinbase: no {quote_currency} rate for {base}"
            ))
        })?;
        let price = parse_price(rate, PROVIDER_COINBASE)?;

        let mut quote = PriceQuote::new(symbol, price, PROVIDER_COINBASE);
        quote.metadata.insert("base_currency".into(), rates.currency);
        Ok(quote)
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            if !self.catalog.is_supported(symbol, PROVIDER_COINBASE) {
                debug!("Coinbase does not support {symbol}, skipping");
                continue;
            }
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("Coinbase fetch failed for {symbol}: {e}"),
            }
        }
        quotes
    }
}
