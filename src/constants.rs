// Global constants for the neofeed oracle

// External API URLs
pub const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";
pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
pub const COINGECKO_PRO_API_BASE: &str = "https://pro-api.coingecko.com/api/v3";
pub const COINMARKETCAP_API_BASE: &str = "https://pro-api.coinmarketcap.com/v1";
pub const KRAKEN_API_BASE: &str = "https://api.kraken.com/0/public";
pub const COINBASE_API_BASE: &str = "https://api.coinbase.com/v2";
pub const OKX_API_BASE: &str = "https://www.okx.com/api/v5";

// Provider names (stable identifiers used in logs and quote metadata)
pub const PROVIDER_BINANCE: &str = "Binance";
pub const PROVIDER_COINGECKO: &str = "CoinGecko";
pub const PROVIDER_COINMARKETCAP: &str = "CoinMarketCap";
pub const PROVIDER_KRAKEN: &str = "Kraken";
pub const PROVIDER_COINBASE: &str = "Coinbase";
pub const PROVIDER_OKX: &str = "OKX";

// HTTP defaults
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 10;
pub const HTTP_USER_AGENT: &str = "neofeed/0.1";

// Resilience defaults
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_JITTER_MAX_MS: u64 = 1_000;
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub const BREAKER_OPEN_SECS: u64 = 30;
pub const RATE_LIMIT_DEFAULT_RPS: u32 = 5;
pub const RATE_LIMIT_KRAKEN_RPS: u32 = 1;
pub const RATE_LIMIT_COINGECKO_RPS: u32 = 10;

// Batch publishing
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const PRICE_SCALE_FACTOR: i64 = 100_000_000;
pub const CONFIRMATION_POLL_INTERVAL_SECS: u64 = 2;
pub const CONFIRMATION_POLL_ATTEMPTS: u32 = 30;
pub const GAS_FEE_RESERVE: i64 = 100_000_000; // 1 GAS kept on the TEE account

// Pipeline retry
pub const PUBLISH_MAX_ATTEMPTS: u32 = 3;
pub const PUBLISH_BASE_DELAY_MS: u64 = 1_000;
pub const PUBLISH_JITTER_MAX_MS: u64 = 500;

// Attestation
pub const ATTESTATION_RETENTION_DAYS: i64 = 7;

// Aggregation confidence baselines
pub const CONFIDENCE_SINGLE_SOURCE: u8 = 60;
pub const CONFIDENCE_TWO_SOURCES: u8 = 80;
pub const CONFIDENCE_FULL: u8 = 100;

// Default canonical symbol list
pub const DEFAULT_SYMBOLS: &str = "BTCUSDT,ETHUSDT,NEOUSDT,GASUSDT,FLMUSDT,NEOBTC";

// Default tracing filter
pub const DEFAULT_TRACING_FILTER: &str =
    "neofeed_oracle=info,neofeed_chain=info,neofeed_attest=info";
