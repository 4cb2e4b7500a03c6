// src/price_feed/providers/coinmarketcap.rs - CoinMarketCap API integration
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{canonical_quote, http_client, price_from_f64, sanitize_symbol};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

#[derive(Debug, Deserialize)]
struct CmcQuotesReply {
    data: HashMap<String, CmcCoin>,
}

#[derive(Debug, Deserialize)]
struct CmcCoin {
    quote: HashMap<String, CmcQuote>,
}

#[derive(Debug, Deserialize)]
struct CmcQuote {
    price: f64,
    #[serde(default)]
    volume_24h: Option<f64>,
}

/// CoinMarketCap provider. Quotes are USD-only, so BTC-suffixed canonical
/// symbols are derived by cross-converting base-USD against BTC-USD.
/// Enabled only when an API key is configured.
pub struct CoinMarketCapProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
    api_key: Option<String>,
}

impl CoinMarketCapProvider {
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

    async fn fetch_usd_quotes(&self, bases: &[String]) -> Result<CmcQuotesReply, FeedError> {
        let key = self.api_key.clone().ok_or_else(|| {
            FeedError::Config("CoinMarketCap adapter used without an API key".into())
        })?;
        let joined = bases
            .iter()
            .map(|b| sanitize_symbol(b))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/cryptocurrency/quotes/latest?symbol={}",
            COINMARKETCAP_API_BASE, joined
        );

        self.policy
            .execute(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header("X-CMC_PRO_API_KEY", &key)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_COINMARKETCAP.into(),
                        status: response.status().as_u16(),
                    });
                }
                response.json().await.map_err(|e| {
                    FeedError::MalformedPayload(format!("CoinMarketCap response: {e}"))
                })
            })
            .await
    }

    fn usd_price(&self, reply: &CmcQuotesReply, base: &str) -> Result<(BigDecimal, Option<f64>), FeedError> {
        let coin = reply.data.get(base).ok_or_else(|| {
            FeedError::MalformedPayload(format!("CoinMarketCap: no data for {base}"))
        })?;
        let quote = coin.quote.get("USD").ok_or_else(|| {
            FeedError::MalformedPayload(format!("CoinMarketCap: no USD quote for {base}"))
        })?;
        Ok((
            price_from_f64(quote.price, PROVIDER_COINMARKETCAP)?,
            quote.volume_24h,
        ))
    }

    async fn fetch_quote(&self, canonical: &str, base: &str) -> Result<PriceQuote, FeedError> {
        let cross_btc = canonical_quote(canonical) == "BTC";
        let bases: Vec<String> = if cross_btc && base != "BTC" {
            vec![base.to_string(), "BTC".to_string()]
        } else {
            vec![base.to_string()]
        };

        let reply = self.fetch_usd_quotes(&bases).await?;
        let (base_usd, volume_usd) = self.usd_price(&reply, base)?;

        // USD-quoted markets serve USDT-suffixed symbols directly; BTC
        // pairs divide through the BTC-USD leg.
        let price = if cross_btc && base != "BTC" {
            let (btc_usd, _) = self.usd_price(&reply, "BTC")?;
            &base_usd / &btc_usd
        } else {
            base_usd.clone()
        };

        // volume_24h is quoted in USD; convert to base units.
        let volume = volume_usd
            .and_then(|v| price_from_f64(v, PROVIDER_COINMARKETCAP).ok())
            .map(|v| v / &base_usd)
            .filter(|v| *v > BigDecimal::zero());

        let mut quote = PriceQuote::new(canonical, price, PROVIDER_COINMARKETCAP).with_volume(volume);
        quote.metadata.insert("base_symbol".into(), base.to_string());
        if cross_btc {
            quote
                .metadata
                .insert("conversion".into(), "usd-cross-btc".into());
        }
        Ok(quote)
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for CoinMarketCapProvider {
    fn name(&self) -> &'static str {
        PROVIDER_COINMARKETCAP
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let base = self
            .catalog
            .source_symbol(symbol, PROVIDER_COINMARKETCAP)
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_COINMARKETCAP.to_string(),
            })?
            .to_string();
        self.fetch_quote(symbol, &base).await
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            if !self.catalog.is_supported(symbol, PROVIDER_COINMARKETCAP) {
                debug!("CoinMarketCap does not support {symbol}, skipping");
                continue;
            }
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("CoinMarketCap fetch failed for {symbol}: {e}"),
            }
        }
        quotes
    }
}
