// src/price_feed/providers/okx.rs - OKX API integration
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::SymbolCatalog;
use crate::constants::*;
use crate::price_feed::providers::{http_client, parse_price, parse_volume};
use crate::price_feed::types::{FeedError, PriceQuote};
use crate::resilience::ResiliencePolicy;

#[derive(Debug, Deserialize)]
struct OkxReply {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<OkxTicker>,
}

#[derive(Debug, Deserialize)]
struct OkxTicker {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(default)]
    vol24h: String,
}

/// OKX provider. Public market-data endpoints; always enabled. Instrument
/// ids come from the catalog (e.g. `NEO-USDT`).
pub struct OkxProvider {
    client: Client,
    catalog: Arc<SymbolCatalog>,
    policy: ResiliencePolicy,
}

impl OkxProvider {
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

    async fn fetch_ticker(&self, canonical: &str, inst_id: &str) -> Result<PriceQuote, FeedError> {
        let url = format!("{}/market/ticker?instId={}", OKX_API_BASE, inst_id);

        let reply: OkxReply = self
            .policy
            .execute(|| async {
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::HttpStatus {
                        provider: PROVIDER_OKX.into(),
                        status: response.status().as_u16(),
                    });
                }
                response
                    .json()
                    .await
                    .map_err(|e| FeedError::MalformedPayload(format!("OKX response: {e}")))
            })
            .await?;

        if reply.code != "0" {
            return Err(FeedError::MalformedPayload(format!(
                "OKX error {}: {}",
                reply.code, reply.msg
            )));
        }
        let ticker = reply.data.into_iter().next().ok_or_else(|| {
            FeedError::MalformedPayload(format!("OKX: empty data for {inst_id}"))
        })?;

        let price = parse_price(&ticker.last, PROVIDER_OKX)?;
        let mut quote = PriceQuote::new(canonical, price, PROVIDER_OKX)
            .with_volume(parse_volume(&ticker.vol24h));
        quote
            .metadata
            .insert("source_symbol".into(), ticker.inst_id);
        Ok(quote)
    }
}

#[async_trait]
impl crate::price_feed::providers::PriceProvider for OkxProvider {
    fn name(&self) -> &'static str {
        PROVIDER_OKX
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        let inst_id = self
            .catalog
            .source_symbol(symbol, PROVIDER_OKX)
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: PROVIDER_OKX.to_string(),
            })?
            .to_string();
        self.fetch_ticker(symbol, &inst_id).await
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        let mut quotes = Vec::new();
        for symbol in symbols {
            if !self.catalog.is_supported(symbol, PROVIDER_OKX) {
                debug!("OKX does not support {symbol}, skipping");
                continue;
            }
            match self.fetch_one(symbol).await {
                Ok(quote) => quotes.push(quote),
                Err(e) => warn!("OKX fetch failed for {symbol}: {e}"),
            }
        }
        quotes
    }
}
