// src/config.rs - Environment-driven configuration for the oracle pipeline
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::constants::*;

/// Everything the pipeline reads from the environment, loaded once at
/// process start. Missing or malformed required values fail fast here.
#[derive(Clone)]
pub struct AppConfig {
    // Chain
    pub rpc_url: String,
    pub oracle_contract_hash: String,
    pub tee_address: String,
    pub tee_wif: String,
    pub master_address: String,
    pub master_wif: String,

    // Symbols
    pub symbols: Vec<String>,
    pub symbol_mapping_overrides: Option<String>,

    // Provider credentials
    pub binance_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub coinmarketcap_api_key: Option<String>,

    // Resilience tuning
    pub provider_timeout_secs: u64,
    pub provider_rate_limits: HashMap<String, u32>,

    // Publishing
    pub max_batch_size: usize,
    pub enable_asset_sweep: bool,

    // Attestation
    pub attestation_dir: PathBuf,
    pub attest_build_commit: String,
    pub attest_run_actor: String,
    pub attest_run_token: String,
}

impl AppConfig {
    /// Load configuration from the environment (`.env` honoured in
    /// development).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rpc_url = require_env("NEO_RPC_URL")?;
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            bail!("NEO_RPC_URL must be an http(s) URL, got {rpc_url}");
        }

        let oracle_contract_hash = require_env("ORACLE_CONTRACT_HASH")?;
        validate_contract_hash(&oracle_contract_hash)?;

        let symbols = parse_symbols(
            &env::var("SYMBOLS").unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string()),
        )?;

        let config = Self {
            rpc_url,
            oracle_contract_hash,
            tee_address: require_env("TEE_ACCOUNT_ADDRESS")?,
            tee_wif: require_env("TEE_ACCOUNT_WIF")?,
            master_address: require_env("MASTER_ACCOUNT_ADDRESS")?,
            master_wif: require_env("MASTER_ACCOUNT_WIF")?,
            symbols,
            symbol_mapping_overrides: optional_env("SYMBOL_MAPPINGS"),
            binance_api_key: optional_env("BINANCE_API_KEY"),
            coingecko_api_key: optional_env("COINGECKO_API_KEY"),
            coinmarketcap_api_key: optional_env("COINMARKETCAP_API_KEY"),
            provider_timeout_secs: parse_env("PROVIDER_TIMEOUT_SECS", HTTP_CLIENT_TIMEOUT_SECS)?,
            provider_rate_limits: default_rate_limits(),
            max_batch_size: parse_env("MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?,
            enable_asset_sweep: parse_env("ENABLE_ASSET_SWEEP", false)?,
            attestation_dir: PathBuf::from(
                env::var("ATTESTATION_DIR").unwrap_or_else(|_| "attestations".to_string()),
            ),
            attest_build_commit: env::var("ATTEST_BUILD_COMMIT")
                .unwrap_or_else(|_| "unknown".to_string()),
            attest_run_actor: env::var("ATTEST_RUN_ACTOR")
                .unwrap_or_else(|_| "unknown".to_string()),
            attest_run_token: env::var("ATTEST_RUN_TOKEN").unwrap_or_default(),
        };

        if config.max_batch_size == 0 {
            bail!("MAX_BATCH_SIZE must be at least 1");
        }
        Ok(config)
    }

    /// Requests-per-second budget for a provider.
    pub fn rate_limit_for(&self, provider: &str) -> u32 {
        self.provider_rate_limits
            .get(provider)
            .copied()
            .unwrap_or(RATE_LIMIT_DEFAULT_RPS)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material and API keys stay out of Debug output.
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url)
            .field("oracle_contract_hash", &self.oracle_contract_hash)
            .field("tee_address", &mask_address(&self.tee_address))
            .field("master_address", &mask_address(&self.master_address))
            .field("symbols", &self.symbols)
            .field("max_batch_size", &self.max_batch_size)
            .field("enable_asset_sweep", &self.enable_asset_sweep)
            .field("attestation_dir", &self.attestation_dir)
            .finish_non_exhaustive()
    }
}

/// Shorten an address to `prefix..suffix` for log lines.
pub fn mask_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}..{}", &address[..5], &address[address.len() - 4..])
}

fn require_env(name: &str) -> Result<String> {
    let value = env::var(name).with_context(|| format!("{name} is required"))?;
    if value.trim().is_empty() {
        bail!("{name} is set but empty");
    }
    Ok(value.trim().to_string())
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is malformed: {e}")),
        Err(_) => Ok(default),
    }
}

fn validate_contract_hash(value: &str) -> Result<()> {
    let hex_part = value.trim_start_matches("0x");
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("ORACLE_CONTRACT_HASH must be a 20-byte hex hash, got {value}");
    }
    Ok(())
}

fn parse_symbols(raw: &str) -> Result<Vec<String>> {
    let symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        bail!("SYMBOLS must list at least one canonical symbol");
    }
    Ok(symbols)
}

fn default_rate_limits() -> HashMap<String, u32> {
    let mut limits = HashMap::new();
    limits.insert(PROVIDER_KRAKEN.to_string(), RATE_LIMIT_KRAKEN_RPS);
    limits.insert(PROVIDER_COINGECKO.to_string(), RATE_LIMIT_COINGECKO_RPS);
    limits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_addresses() {
        assert_eq!(
            mask_address("NVfJmhP28Q9qva9Tdtpt3af4H1a3cp7Lih"),
            "NVfJm..7Lih"
        );
        assert_eq!(mask_address("short"), "short");
    }

    #[test]
    fn symbol_parsing_normalizes_case_and_whitespace() {
        let symbols = parse_symbols(" btcusdt , NEOusdt ,").unwrap();
        assert_eq!(symbols, vec!["BTCUSDT", "NEOUSDT"]);
        assert!(parse_symbols(" , ").is_err());
    }

    #[test]
    fn contract_hash_validation() {
        assert!(
            validate_contract_hash("0xd2a4cff31913016155e38e474a2c06d08be276cf").is_ok()
        );
        assert!(validate_contract_hash("0x1234").is_err());
        assert!(validate_contract_hash("not-a-hash").is_err());
    }

    #[test]
    fn default_rate_limits_cover_throttled_providers() {
        let limits = default_rate_limits();
        assert_eq!(limits[PROVIDER_KRAKEN], RATE_LIMIT_KRAKEN_RPS);
        assert_eq!(limits[PROVIDER_COINGECKO], RATE_LIMIT_COINGECKO_RPS);
    }
}
