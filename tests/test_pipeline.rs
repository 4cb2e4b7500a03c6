// Integration tests for the end-to-end pipeline run with mock providers
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use parking_lot::Mutex;
use tempfile::TempDir;

use neofeed_attest::{AttestationService, BatchAttestation, RunSecret};
use neofeed_chain::{ChainError, ScriptHash, TokenBalance};
use neofeed_oracle::config::AppConfig;
use neofeed_oracle::price_feed::types::{BatchStatus, FeedError, PriceQuote};
use neofeed_oracle::price_feed::{
    BatchPublisher, OracleChain, PipelineRunner, PriceProvider, PublisherConfig,
};
use neofeed_oracle::resilience::ResilienceLayer;

struct MockProvider {
    name: &'static str,
    enabled: bool,
    quotes: Vec<(&'static str, &'static str)>,
    fail: bool,
}

#[async_trait]
impl PriceProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote, FeedError> {
        if self.fail {
            return Err(FeedError::MalformedPayload("upstream 503".into()));
        }
        self.quotes
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(s, p)| PriceQuote::new(*s, BigDecimal::from_str(p).unwrap(), self.name))
            .ok_or_else(|| FeedError::Unsupported {
                symbol: symbol.to_string(),
                provider: self.name.to_string(),
            })
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Vec<PriceQuote> {
        if self.fail {
            // A provider whose every request exhausted its retries
            // contributes an empty list.
            return Vec::new();
        }
        symbols
            .iter()
            .filter_map(|symbol| {
                self.quotes
                    .iter()
                    .find(|(s, _)| s == symbol)
                    .map(|(s, p)| PriceQuote::new(*s, BigDecimal::from_str(p).unwrap(), self.name))
            })
            .collect()
    }
}

struct MockChain {
    updates: Mutex<Vec<Vec<u8>>>,
    fail_all: bool,
}

#[async_trait]
impl OracleChain for MockChain {
    async fn submit_update(&self, script: Vec<u8>) -> Result<String, FeedError> {
        if self.fail_all {
            return Err(FeedError::ChainReject(ChainError::Rpc {
                code: -500,
                message: "node down".into(),
            }));
        }
        let mut updates = self.updates.lock();
        updates.push(script);
        Ok(format!("0xtx{:04}", updates.len()))
    }

    async fn submit_transfer(&self, _script: Vec<u8>) -> Result<String, FeedError> {
        Ok("0xsweep".into())
    }

    async fn confirmations(&self, _tx_hash: &str) -> Result<u32, FeedError> {
        Ok(1)
    }

    async fn token_balances(&self, _address: &str) -> Result<Vec<TokenBalance>, FeedError> {
        Ok(vec![])
    }

    fn oracle_contract(&self) -> ScriptHash {
        ScriptHash([0xAA; 20])
    }

    fn tee_script_hash(&self) -> ScriptHash {
        ScriptHash([0x01; 20])
    }

    fn master_script_hash(&self) -> ScriptHash {
        ScriptHash([0x02; 20])
    }

    async fn tee_address(&self) -> Result<String, FeedError> {
        Ok("NTeeAccountMockAddress0000000000000".to_string())
    }
}

fn test_config(symbols: &[&str]) -> AppConfig {
    AppConfig {
        rpc_url: "http://localhost:10332".into(),
        oracle_contract_hash: "0x".to_string() + &"ab".repeat(20),
        tee_address: "NTee".into(),
        tee_wif: "unused".into(),
        master_address: "NMaster".into(),
        master_wif: "unused".into(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        symbol_mapping_overrides: None,
        binance_api_key: None,
        coingecko_api_key: None,
        coinmarketcap_api_key: None,
        provider_timeout_secs: 2,
        provider_rate_limits: HashMap::new(),
        max_batch_size: 50,
        enable_asset_sweep: false,
        attestation_dir: PathBuf::from("unused"),
        attest_build_commit: "test".into(),
        attest_run_actor: "tester".into(),
        attest_run_token: "token".into(),
    }
}

struct Harness {
    runner: PipelineRunner,
    chain: Arc<MockChain>,
    attest_dir: TempDir,
}

fn harness(
    providers: Vec<Arc<dyn PriceProvider>>,
    symbols: &[&str],
    chain_fails: bool,
) -> Harness {
    let config = test_config(symbols);
    let resilience = ResilienceLayer::new(&config);
    let chain = Arc::new(MockChain {
        updates: Mutex::new(Vec::new()),
        fail_all: chain_fails,
    });
    let attest_dir = TempDir::new().unwrap();
    let attestor = Arc::new(AttestationService::new(
        attest_dir.path(),
        RunSecret {
            build_commit: "test".into(),
            run_actor: "tester".into(),
            run_token: "token".into(),
        },
    ));
    let mut publisher_config = PublisherConfig::new(50, false, "testnet".into());
    publisher_config.poll_interval = Duration::from_millis(5);
    publisher_config.poll_attempts = 2;
    let publisher = Arc::new(BatchPublisher::new(
        chain.clone(),
        attestor.clone(),
        publisher_config,
    ));
    let runner = PipelineRunner::new(
        providers,
        publisher,
        attestor,
        resilience,
        symbols.iter().map(|s| s.to_string()).collect(),
    );
    Harness {
        runner,
        chain,
        attest_dir,
    }
}

fn batch_attestations(dir: &TempDir) -> Vec<BatchAttestation> {
    let mut records = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir.path().join("price_feed")) {
        for entry in entries.flatten() {
            let contents = std::fs::read_to_string(entry.path()).unwrap();
            records.push(serde_json::from_str(&contents).unwrap());
        }
    }
    records
}

#[tokio::test]
async fn no_enabled_providers_is_fatal_and_writes_nothing() {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(MockProvider {
            name: "Binance",
            enabled: false,
            quotes: vec![],
            fail: false,
        }),
        Arc::new(MockProvider {
            name: "CoinMarketCap",
            enabled: false,
            quotes: vec![],
            fail: false,
        }),
    ];
    let h = harness(providers, &["BTCUSDT"], false);

    let result = h.runner.run().await;
    assert!(matches!(result, Err(FeedError::NoEnabledProviders)));
    assert!(h.chain.updates.lock().is_empty());
    assert!(batch_attestations(&h.attest_dir).is_empty());
}

#[tokio::test]
async fn all_providers_empty_is_no_data() {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![Arc::new(MockProvider {
        name: "Kraken",
        enabled: true,
        quotes: vec![],
        fail: true,
    })];
    let h = harness(providers, &["BTCUSDT"], false);

    let result = h.runner.run().await;
    assert!(matches!(result, Err(FeedError::NoData)));
}

#[tokio::test]
async fn happy_path_three_providers_reach_confirmed() {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(MockProvider {
            name: "Binance",
            enabled: true,
            quotes: vec![("BTCUSDT", "50000.00")],
            fail: false,
        }),
        Arc::new(MockProvider {
            name: "CoinGecko",
            enabled: true,
            quotes: vec![("BTCUSDT", "50000.50")],
            fail: false,
        }),
        Arc::new(MockProvider {
            name: "OKX",
            enabled: true,
            quotes: vec![("BTCUSDT", "50001.00")],
            fail: false,
        }),
    ];
    let h = harness(providers, &["BTCUSDT"], false);

    let report = h.runner.run().await.unwrap();
    assert_eq!(report.quotes_fetched, 3);
    assert_eq!(report.symbols_aggregated, 1);
    let status = report.final_status.unwrap();
    assert_eq!(status.status, BatchStatus::Confirmed);

    // Median 50000.50, scaled by 10^8, lands in the submitted script.
    let updates = h.chain.updates.lock();
    assert_eq!(updates.len(), 1);
    let scaled = 5_000_050_000_000i64.to_le_bytes();
    assert!(updates[0].windows(8).any(|w| w == scaled));

    let receipts = batch_attestations(&h.attest_dir);
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].price_summaries[0].confidence, 100);
}

#[tokio::test]
async fn partial_provider_failure_still_publishes_with_confidence_80() {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(MockProvider {
            name: "Binance",
            enabled: true,
            quotes: vec![],
            fail: true,
        }),
        Arc::new(MockProvider {
            name: "CoinMarketCap",
            enabled: true,
            quotes: vec![],
            fail: true,
        }),
        Arc::new(MockProvider {
            name: "CoinGecko",
            enabled: true,
            quotes: vec![("NEOUSDT", "10.00")],
            fail: false,
        }),
        Arc::new(MockProvider {
            name: "OKX",
            enabled: true,
            quotes: vec![("NEOUSDT", "10.10")],
            fail: false,
        }),
    ];
    let h = harness(providers, &["NEOUSDT"], false);

    let report = h.runner.run().await.unwrap();
    assert_eq!(report.quotes_fetched, 2);

    // Mean of the two survivors: 10.05 -> 1_005_000_000.
    let updates = h.chain.updates.lock();
    let scaled = 1_005_000_000i32.to_le_bytes();
    assert!(updates[0].windows(4).any(|w| w == scaled));

    let receipts = batch_attestations(&h.attest_dir);
    assert_eq!(receipts[0].price_summaries[0].confidence, 80);
    assert_eq!(receipts[0].price_summaries[0].symbol, "NEOUSDT");
}

#[tokio::test]
async fn all_publish_attempts_failing_is_fatal_but_reported() {
    let providers: Vec<Arc<dyn PriceProvider>> = vec![Arc::new(MockProvider {
        name: "CoinGecko",
        enabled: true,
        quotes: vec![("BTCUSDT", "50000")],
        fail: false,
    })];
    let h = harness(providers, &["BTCUSDT"], true);

    let result = h.runner.run().await;
    assert!(matches!(result, Err(FeedError::ChainReject(_))));
    // Nothing made it on-chain, so nothing was attested.
    assert!(batch_attestations(&h.attest_dir).is_empty());
}

#[tokio::test]
async fn two_runs_produce_distinct_batch_ids() {
    let make_providers = || -> Vec<Arc<dyn PriceProvider>> {
        vec![Arc::new(MockProvider {
            name: "CoinGecko",
            enabled: true,
            quotes: vec![("BTCUSDT", "50000")],
            fail: false,
        })]
    };
    let first = harness(make_providers(), &["BTCUSDT"], false);
    let second = harness(make_providers(), &["BTCUSDT"], false);

    let a = first.runner.run().await.unwrap().batch_id.unwrap();
    let b = second.runner.run().await.unwrap().batch_id.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn provider_without_symbol_support_contributes_no_quote() {
    // Property 1: a published batch never carries a quote from a provider
    // that does not support the symbol; unsupported symbols simply do not
    // show up in that provider's contribution.
    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(MockProvider {
            name: "Kraken",
            enabled: true,
            quotes: vec![("BTCUSDT", "50000")],
            fail: false,
        }),
        Arc::new(MockProvider {
            name: "OKX",
            enabled: true,
            quotes: vec![("BTCUSDT", "50002"), ("NEOUSDT", "10")],
            fail: false,
        }),
    ];
    let h = harness(providers, &["BTCUSDT", "NEOUSDT"], false);

    let report = h.runner.run().await.unwrap();
    // Kraken has no NEOUSDT: 2 BTC quotes + 1 NEO quote.
    assert_eq!(report.quotes_fetched, 3);
    assert_eq!(report.symbols_aggregated, 2);

    let receipts = batch_attestations(&h.attest_dir);
    let summaries = &receipts[0].price_summaries;
    let neo = summaries.iter().find(|s| s.symbol == "NEOUSDT").unwrap();
    assert_eq!(neo.confidence, 60); // single-source
    let btc = summaries.iter().find(|s| s.symbol == "BTCUSDT").unwrap();
    assert_eq!(btc.confidence, 80); // two sources
}
