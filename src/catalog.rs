// src/catalog.rs - Canonical symbol to provider-native symbol catalog
use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;

use crate::constants::*;

/// Immutable lookup table mapping (canonical symbol, provider) to the
/// provider's native symbol form. Built once at startup; lookups never
/// fail, an unknown pair is simply unsupported.
#[derive(Debug, Clone)]
pub struct SymbolCatalog {
    mappings: HashMap<(String, String), String>,
}

impl SymbolCatalog {
    /// Catalog with the built-in mapping table.
    pub fn new() -> Self {
        Self {
            mappings: default_mappings(),
        }
    }

    /// Catalog with JSON overrides merged over the defaults. The override
    /// shape is `{canonical: {provider: native}}`; an empty native string
    /// marks the pair unsupported.
    pub fn with_overrides(overrides_json: &str) -> Result<Self> {
        let overrides: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(overrides_json)
                .context("SYMBOL_MAPPINGS must be a {canonical: {provider: native}} object")?;
        let mut mappings = default_mappings();
        for (canonical, providers) in overrides {
            for (provider, native) in providers {
                debug!(
                    "Symbol mapping override: {} @ {} -> {:?}",
                    canonical, provider, native
                );
                mappings.insert((canonical.to_uppercase(), provider), native);
            }
        }
        Ok(Self { mappings })
    }

    /// The provider's name for a canonical symbol, if supported.
    pub fn source_symbol(&self, canonical: &str, provider: &str) -> Option<&str> {
        self.mappings
            .get(&(canonical.to_uppercase(), provider.to_string()))
            .map(String::as_str)
            .filter(|native| !native.is_empty())
    }

    /// True iff the provider has a non-empty mapping for the symbol.
    pub fn is_supported(&self, canonical: &str, provider: &str) -> bool {
        self.source_symbol(canonical, provider).is_some()
    }

    /// All canonical symbols a provider supports, sorted for stable logs.
    pub fn supported_symbols(&self, provider: &str) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .mappings
            .iter()
            .filter(|((_, p), native)| p == provider && !native.is_empty())
            .map(|((canonical, _), _)| canonical.clone())
            .collect();
        symbols.sort();
        symbols
    }
}

impl Default for SymbolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn default_mappings() -> HashMap<(String, String), String> {
    let mut m = HashMap::new();
    let mut insert = |canonical: &str, provider: &str, native: &str| {
        m.insert(
            (canonical.to_string(), provider.to_string()),
            native.to_string(),
        );
    };

    // Binance trades the canonical pairs directly.
    insert("BTCUSDT", PROVIDER_BINANCE, "BTCUSDT");
    insert("ETHUSDT", PROVIDER_BINANCE, "ETHUSDT");
    insert("NEOUSDT", PROVIDER_BINANCE, "NEOUSDT");
    insert("GASUSDT", PROVIDER_BINANCE, "GASUSDT");
    insert("FLMUSDT", PROVIDER_BINANCE, "FLMUSDT");
    insert("NEOBTC", PROVIDER_BINANCE, "NEOBTC");

    // CoinGecko uses coin ids; the quote currency comes from the canonical
    // suffix at request time.
    insert("BTCUSDT", PROVIDER_COINGECKO, "bitcoin");
    insert("ETHUSDT", PROVIDER_COINGECKO, "ethereum");
    insert("NEOUSDT", PROVIDER_COINGECKO, "neo");
    insert("GASUSDT", PROVIDER_COINGECKO, "gas");
    insert("FLMUSDT", PROVIDER_COINGECKO, "flamingo-finance");
    insert("NEOBTC", PROVIDER_COINGECKO, "neo");

    // CoinMarketCap quotes in USD against the base asset symbol.
    insert("BTCUSDT", PROVIDER_COINMARKETCAP, "BTC");
    insert("ETHUSDT", PROVIDER_COINMARKETCAP, "ETH");
    insert("NEOUSDT", PROVIDER_COINMARKETCAP, "NEO");
    insert("GASUSDT", PROVIDER_COINMARKETCAP, "GAS");
    insert("FLMUSDT", PROVIDER_COINMARKETCAP, "FLM");
    insert("NEOBTC", PROVIDER_COINMARKETCAP, "NEO");

    // Kraken lists BTC as XBT and carries only the majors we need.
    insert("BTCUSDT", PROVIDER_KRAKEN, "XBTUSDT");
    insert("ETHUSDT", PROVIDER_KRAKEN, "ETHUSDT");

    // Coinbase exchange-rates keys off the base currency.
    insert("BTCUSDT", PROVIDER_COINBASE, "BTC");
    insert("ETHUSDT", PROVIDER_COINBASE, "ETH");

    // OKX instrument ids.
    insert("BTCUSDT", PROVIDER_OKX, "BTC-USDT");
    insert("ETHUSDT", PROVIDER_OKX, "ETH-USDT");
    insert("NEOUSDT", PROVIDER_OKX, "NEO-USDT");
    insert("GASUSDT", PROVIDER_OKX, "GAS-USDT");
    insert("FLMUSDT", PROVIDER_OKX, "FLM-USDT");
    insert("NEOBTC", PROVIDER_OKX, "NEO-BTC");

    m
}
