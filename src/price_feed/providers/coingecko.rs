// src/price_feed/providers/coingecko.rs - CoinGecko API integration
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::Zero;
use reqwest::Client;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{canonical_quote, http_client, price_from_f64};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

/// CoinGecko provider. Works from the public simple-price endpoint; a pro
/// key only raises the rate ceiling, so the adapter is always enabled.
pub struct CoinGeckoProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
    api_key: Option<String>,
}

impl CoinGeckoProvider {
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

    fn api_base(&self) -> &'static str {
        if self.api_key.is_some() {
            COINGECKO_PRO_API_BASE
        } else {
            COINGECKO_API_BASE
        }
    }

    /// One simple-price call covering every (coin id, vs currency) pair the
    /// requested symbols need. This is CoinGecko's native batch endpoint.
    async fn fetch_simple_price(
        &self,
        requests: &[(String, String, String)], // (canonical, coin id, vs currency)
    ) -> Result<HashMap<String, serde_json::Value>, FeedError> {
        let ids: HashSet<&str> = requests.iter().map(|(_, id, _)| id.as_str()).collect();
        let vs: HashSet<String> = requests
            .iter()
            .map(|(_, _, vs)| vs.to_lowercase())
            .collect();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_vol=true",
            self.api_base(),
            ids.into_iter().collect::<Vec<_>>().join(","),
            vs.into_iter().collect::<Vec<_>>().join(","),
        );

        self.policy
            .execute(|| async {
                let mut request = self.client.get(&url);
                if let Some(ref key) = self.api_key {
                    request = request.header("X-CG-Pro-API-Key", key);
                }
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_COINGECKO.into(),
                        status: response.status().as_u16(),
                    });
                }
                response.json().await.map_err(|e| {
                    FeedError::MalformedPayload(format!("CoinGecko response: {e}"))
                })
            })
            .await
    }

    fn quote_from_payload(
        &self,
        canonical: &str,
        coin_id: &str,
        vs: &str,
        payload: &HashMap<String, serde_json::Value>,
    ) -> Result<PriceQuote, FeedError> {
        let coin = payload.get(coin_id).ok_or_else(|| {
            FeedError::MalformedPayload(format!("CoinGecko: no data for {coin_id}"))
        })?;
        let vs_key = vs.to_lowercase();
        let price_raw = coin.get(&vs_key).and_then(|v| v.as_f64()).ok_or_else(|| {
            FeedError::MalformedPayload(format!("CoinGecko: missing {vs_key} price for {coin_id}"))
        })?;
        let price = price_from_f64(price_raw, PROVIDER_COINGECKO)?;

        // The endpoint reports quote-currency volume; convert to base units.
        let volume = coin
            .get(&format!("{vs_key}_24h_vol"))
            .and_then(|v| v.as_f64())
            .and_then(|quote_vol| price_from_f64(quote_vol, PROVIDER_COINGECKO).ok())
            .map(|quote_vol| quote_vol / &price)
            .filter(|v| *v > bigdecimal::BigDecimal::zero());

        let mut quote = PriceQuote::new(canonical, price, PROVIDER_COINGECKO).with_volume(volume);
        quote.metadata.insert("coin_id".into(), coin_id.to_string());
        quote.metadata.insert("vs_currency".into(), vs_key);
        Ok(quote)
    }

    fn request_plan(&self, symbols: &[String]) -> Vec<(String, String, String)> {
        symbols
            .iter()
            .filter_map(|symbol| {
                let coin_id = self.catalog.source_symbol(symbol, PROVIDER_COINGECKO)?;
                Some((
                    symbol.clone(),
                    coin_id.to_string(),
                    canonical_quote(symbol).to_string(),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_COINGECKO
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let requested = [symbol.to_string()];
        let plan = self.request_plan(&requested);
        let (canonical, coin_id, vs) = plan.into_iter().next().ok_or_else(|| {
            FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_COINGECKO.to_string(),
            }
        })?;
        let payload = self
            .fetch_simple_price(&[(canonical.clone(), coin_id.clone(), vs.clone())])
            .await?;
        self.quote_from_payload(&canonical, &coin_id, &vs, &payload)
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let plan = self.request_plan(symbols);
        if plan.is_empty() {
            debug!("CoinGecko supports none of the requested symbols");
            return Vec::new();
        }

        let payload = match self.fetch_simple_price(&plan).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("CoinGecko batch fetch failed: {e}");
                return Vec::new();
            }
        };

        let mut quotes = Vec::new();
        for (canonical, coin_id, vs) in &plan {
            match self.quote_from_payload(canonical, coin_id, vs, &payload) {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("CoinGecko quote failed for {canonical}: {e}"),
            }
        }
        quotes
    }
}
