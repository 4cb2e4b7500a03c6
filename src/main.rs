// src/main.rs - One-shot oracle pipeline entry point
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neofeed_attest::{AttestationService, RunSecret};
use neofeed_chain::{KeyPair, NeoChainClient, ScriptHash};
use neofeed_oracle::catalog::SymbolCatalog;
use neofeed_oracle::config::{mask_address, AppConfig};
use neofeed_oracle::constants::DEFAULT_TRACING_FILTER;
use neofeed_oracle::price_feed::{
    build_providers, BatchPublisher, OracleChain, PipelineRunner, PublisherConfig,
};
use neofeed_oracle::resilience::ResilienceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let runner = build_runner(&config)?;

    info!("neofeed oracle run starting ({} symbols)", config.symbols.len());

    tokio::select! {
        result = runner.run() => {
            let report = result?;
            info!(
                "Run complete: {} quote(s) fetched, {} symbol(s) aggregated",
                report.quotes_fetched, report.symbols_aggregated
            );
            if let Some(status) = &report.final_status {
                info!(
                    "Batch {}: status {}, tx {}",
                    status.batch_id,
                    status.status,
                    status.tx_hash.as_deref().unwrap_or("-")
                );
            }
            for health in &report.provider_health {
                info!(
                    "Provider {}: enabled={}, breaker={}",
                    health.name, health.enabled, health.breaker_state
                );
            }
            Ok(())
        }
        _ = shutdown_signal() => {
            warn!("Shutdown signal received, aborting run");
            anyhow::bail!("run cancelled by signal");
        }
    }
}

fn build_runner(config: &AppConfig) -> anyhow::Result<PipelineRunner> {
    let catalog = match &config.symbol_mapping_overrides {
        Some(overrides) => SymbolCatalog::with_overrides(overrides)?,
        None => SymbolCatalog::new(),
    };
    let catalog = Arc::new(catalog);

    let resilience = ResilienceLayer::new(config);
    let providers = build_providers(config, catalog, &resilience)?;

    let tee_key = KeyPair::from_wif(&config.tee_wif)
        .map_err(|e| anyhow::anyhow!("TEE_ACCOUNT_WIF rejected: {e}"))?;
    let master_key = KeyPair::from_wif(&config.master_wif)
        .map_err(|e| anyhow::anyhow!("MASTER_ACCOUNT_WIF rejected: {e}"))?;
    check_configured_address(&tee_key, &config.tee_address, "TEE");
    check_configured_address(&master_key, &config.master_address, "Master");

    let oracle_contract = ScriptHash::from_hex_be(&config.oracle_contract_hash)?;
    let chain: Arc<dyn OracleChain> = Arc::new(NeoChainClient::new(
        config.rpc_url.clone(),
        oracle_contract,
        tee_key,
        master_key,
    )?);

    let attestor = Arc::new(AttestationService::new(
        config.attestation_dir.clone(),
        RunSecret {
            build_commit: config.attest_build_commit.clone(),
            run_actor: config.attest_run_actor.clone(),
            run_token: config.attest_run_token.clone(),
        },
    ));

    let publisher = Arc::new(BatchPublisher::new(
        chain,
        attestor.clone(),
        PublisherConfig::new(
            config.max_batch_size,
            config.enable_asset_sweep,
            config.rpc_url.clone(),
        ),
    ));

    Ok(PipelineRunner::new(
        providers,
        publisher,
        attestor,
        resilience,
        config.symbols.clone(),
    ))
}

/// Warn (without failing) when a configured address does not match the one
/// derived from the key, assuming the common N3 address version.
fn check_configured_address(key: &KeyPair, configured: &str, label: &str) {
    let derived = key.address(0x35);
    if derived != configured {
        warn!(
            "{} address {} does not match the key-derived address {}",
            label,
            mask_address(configured),
            mask_address(&derived)
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_TRACING_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
