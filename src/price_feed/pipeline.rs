// src/price_feed/pipeline.rs - Single-shot oracle run orchestration
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use neofeed_attest::AttestationService;

use crate::constants::*;
use crate::price_feed::aggregator::PriceAggregator;
use crate::price_feed::providers::PriceProvider;
use crate::price_feed::publisher::BatchPublisher;
use crate::price_feed::types::{
    BatchStatusInfo, FeedError, PriceBatch, PriceQuote, ProviderHealth,
};
use crate::resilience::ResilienceLayer;

/// Summary of one pipeline run, logged by the binary.
#[derive(Debug)]
pub struct RunReport {
    pub quotes_fetched: usize,
    pub symbols_aggregated: usize,
    pub batch_id: Option<Uuid>,
    pub final_status: Option<BatchStatusInfo>,
    pub provider_health: Vec<ProviderHealth>,
}

/// The single entry point invoked per run: fan out to every enabled
/// adapter, aggregate, publish with retry, then prune old attestations.
pub struct PipelineRunner {
    providers: Vec<Arc<dyn PriceProvider>>,
    aggregator: PriceAggregator,
    publisher: Arc<BatchPublisher>,
    attestor: Arc<AttestationService>,
    resilience: ResilienceLayer,
    symbols: Vec<String>,
}

impl PipelineRunner {
    pub fn new(
        providers: Vec<Arc<dyn PriceProvider>>,
        publisher: Arc<BatchPublisher>,
        attestor: Arc<AttestationService>,
        resilience: ResilienceLayer,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            providers,
            aggregator: PriceAggregator::new(),
            publisher,
            attestor,
            resilience,
            symbols,
        }
    }

    pub async fn run(&self) -> Result<RunReport, FeedError> {
        let enabled: Vec<Arc<dyn PriceProvider>> = self
            .providers
            .iter()
            .filter(|p| p.is_enabled())
            .cloned()
            .collect();
        for provider in &self.providers {
            if !provider.is_enabled() {
                info!("Provider {} is disabled, skipping", provider.name());
            }
        }
        if enabled.is_empty() {
            return Err(FeedError::NoEnabledProviders);
        }
        info!(
            "Starting run with {} enabled provider(s) over {} symbol(s)",
            enabled.len(),
            self.symbols.len()
        );

        let quotes_by_symbol = self.fetch_all(&enabled).await;
        let quotes_fetched: usize = quotes_by_symbol.values().map(Vec::len).sum();
        if quotes_by_symbol.is_empty() {
            return Err(FeedError::NoData);
        }
        info!(
            "Collected {} quote(s) across {} symbol(s)",
            quotes_fetched,
            quotes_by_symbol.len()
        );

        let aggregated = self.aggregator.aggregate_all(quotes_by_symbol).await;
        if aggregated.is_empty() {
            return Err(FeedError::NoData);
        }
        let symbols_aggregated = aggregated.len();

        let batch = PriceBatch::new(aggregated)?;
        let batch_id = batch.batch_id;
        let publish_result = self.publish_with_retry(&batch).await;

        // Confirmation monitors and retention cleanup run regardless of
        // the publish outcome.
        self.publisher.await_monitors().await;
        let pruned = self.attestor.prune_older_than(ATTESTATION_RETENTION_DAYS);
        if pruned > 0 {
            info!("Attestation cleanup removed {pruned} file(s)");
        }

        let report = RunReport {
            quotes_fetched,
            symbols_aggregated,
            batch_id: Some(batch_id),
            final_status: Some(self.publisher.status(batch_id)),
            provider_health: self.provider_health(),
        };

        match publish_result {
            Ok(()) => Ok(report),
            Err(e) => {
                error!("All publish attempts failed for batch {}: {}", batch_id, e);
                Err(e)
            }
        }
    }

    /// Fan out `fetch_batch` across adapters, one task each; a failing or
    /// panicking adapter contributes nothing. Results are merged into a
    /// per-symbol map after all tasks settle.
    async fn fetch_all(
        &self,
        enabled: &[Arc<dyn PriceProvider>],
    ) -> HashMap<String, Vec<PriceQuote>> {
        let tasks: Vec<_> = enabled
            .iter()
            .map(|provider| {
                let provider = provider.clone();
                let symbols = self.symbols.clone();
                tokio::spawn(async move {
                    let quotes = provider.fetch_batch(&symbols).await;
                    info!(
                        "Provider {} contributed {} quote(s)",
                        provider.name(),
                        quotes.len()
                    );
                    quotes
                })
            })
            .collect();

        let mut merged: HashMap<String, Vec<PriceQuote>> = HashMap::new();
        for result in join_all(tasks).await {
            match result {
                Ok(quotes) => {
                    for quote in quotes {
                        merged.entry(quote.symbol.clone()).or_default().push(quote);
                    }
                }
                Err(e) => warn!("Provider task aborted: {e}"),
            }
        }
        merged
    }

    /// Publish with exponential backoff. Any successful attempt ends the
    /// loop; the final failure propagates to the caller.
    async fn publish_with_retry(&self, batch: &PriceBatch) -> Result<(), FeedError> {
        let mut last_error = None;
        for attempt in 0..PUBLISH_MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = publish_backoff(attempt);
                warn!(
                    "Retrying publish of batch {} in {:?} (attempt {}/{})",
                    batch.batch_id,
                    delay,
                    attempt + 1,
                    PUBLISH_MAX_ATTEMPTS
                );
                tokio::time::sleep(delay).await;
            }
            match self.publisher.publish(batch).await {
                Ok(info) => {
                    info!(
                        "Batch {} published with status {} ({}/{} quotes)",
                        batch.batch_id, info.status, info.processed, info.total
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Publish attempt {} for batch {} failed: {}",
                        attempt + 1,
                        batch.batch_id,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(FeedError::Cancelled))
    }

    fn provider_health(&self) -> Vec<ProviderHealth> {
        self.providers
            .iter()
            .map(|p| ProviderHealth {
                name: p.name().to_string(),
                enabled: p.is_enabled(),
                breaker_state: self.resilience.breaker_state(p.name()).to_string(),
            })
            .collect()
    }
}

fn publish_backoff(attempt: u32) -> Duration {
    let base = PUBLISH_BASE_DELAY_MS * (1u64 << attempt.min(16));
    let jitter = rand::thread_rng().gen_range(0..PUBLISH_JITTER_MAX_MS);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        for _ in 0..20 {
            let first = publish_backoff(1);
            assert!(first >= Duration::from_millis(2_000));
            assert!(first < Duration::from_millis(2_500));
            let second = publish_backoff(2);
            assert!(second >= Duration::from_millis(4_000));
            assert!(second < Duration::from_millis(4_500));
        }
    }
}
