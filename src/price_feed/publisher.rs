// src/price_feed/publisher.rs - Batch submission, status tracking, sweep
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use neofeed_attest::{AttestationService, PriceSummary, RunMetadata};
use neofeed_chain::{nep17_transfer_script, update_price_batch_script, ScriptHash, GAS_TOKEN_HASH};

use crate::config::mask_address;
use crate::constants::*;
use crate::price_feed::chain::OracleChain;
use crate::price_feed::types::{
    AggregatedQuote, BatchStatus, BatchStatusInfo, FeedError, PriceBatch,
};

/// Publisher tuning, lifted from the app config.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_batch_size: usize,
    pub enable_asset_sweep: bool,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub network: String,
}

impl PublisherConfig {
    pub fn new(max_batch_size: usize, enable_asset_sweep: bool, network: String) -> Self {
        Self {
            max_batch_size,
            enable_asset_sweep,
            poll_interval: Duration::from_secs(CONFIRMATION_POLL_INTERVAL_SECS),
            poll_attempts: CONFIRMATION_POLL_ATTEMPTS,
            network,
        }
    }
}

/// Publishes price batches to the oracle contract and tracks their
/// lifecycle until confirmation or terminal failure.
pub struct BatchPublisher {
    chain: Arc<dyn OracleChain>,
    attestor: Arc<AttestationService>,
    config: PublisherConfig,
    statuses: Arc<RwLock<HashMap<Uuid, BatchStatusInfo>>>,
    tx_hashes: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchPublisher {
    pub fn new(
        chain: Arc<dyn OracleChain>,
        attestor: Arc<AttestationService>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            chain,
            attestor,
            config,
            statuses: Arc::new(RwLock::new(HashMap::new())),
            tx_hashes: Arc::new(RwLock::new(HashMap::new())),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Publish one batch: optional asset sweep, sub-batch split, dual-signed
    /// submission, attestation, then background confirmation monitoring.
    pub async fn publish(&self, batch: &PriceBatch) -> Result<BatchStatusInfo, FeedError> {
        if batch.is_empty() {
            return Err(FeedError::InvalidBatch("empty batch".into()));
        }
        let batch_id = batch.batch_id;
        let total = batch.len();
        info!("Publishing batch {} with {} quote(s)", batch_id, total);

        // A failed batch may be re-published by the pipeline's retry loop;
        // the attempt restarts the lifecycle from scratch.
        self.reset_failed(batch_id);
        self.set_status(batch_id, BatchStatus::Processing, None, 0, total);

        if self.config.enable_asset_sweep {
            if let Err(e) = self.sweep_assets().await {
                warn!("Asset sweep failed (continuing): {e}");
            }
        }

        let mut processed = 0usize;
        let mut last_tx_hash = None;
        for sub_batch in batch.quotes.chunks(self.config.max_batch_size) {
            let tx_hash = match self.submit_sub_batch(batch_id, sub_batch).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!("Batch {} failed after {} quote(s): {}", batch_id, processed, e);
                    self.set_status(
                        batch_id,
                        BatchStatus::Failed,
                        last_tx_hash.clone(),
                        processed,
                        total,
                    );
                    return Err(e);
                }
            };

            // No receipt, no publish: attestation is part of the contract.
            if let Err(e) = self.attest_sub_batch(batch_id, &tx_hash, sub_batch) {
                error!("Attestation failed for batch {}: {}", batch_id, e);
                self.set_status(batch_id, BatchStatus::Failed, Some(tx_hash), processed, total);
                return Err(FeedError::Attestation(e));
            }

            processed += sub_batch.len();
            self.tx_hashes
                .write()
                .entry(batch_id)
                .or_default()
                .push(tx_hash.clone());
            last_tx_hash = Some(tx_hash);
            debug!("Batch {}: {}/{} quotes submitted", batch_id, processed, total);
        }

        self.set_status(
            batch_id,
            BatchStatus::Sent,
            last_tx_hash.clone(),
            processed,
            total,
        );

        self.spawn_monitor(batch_id);
        Ok(self.status(batch_id))
    }

    /// Rich status for a batch; `Unknown` if this publisher never saw it.
    pub fn status(&self, batch_id: Uuid) -> BatchStatusInfo {
        self.statuses
            .read()
            .get(&batch_id)
            .cloned()
            .unwrap_or_else(|| BatchStatusInfo::unknown(batch_id))
    }

    /// Transaction hashes submitted for a batch, in sub-batch order.
    pub fn tx_hashes(&self, batch_id: Uuid) -> Vec<String> {
        self.tx_hashes
            .read()
            .get(&batch_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Wait for every background confirmation monitor to finish. Called by
    /// the runner before the process exits.
    pub async fn await_monitors(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.monitors.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Confirmation monitor aborted: {e}");
            }
        }
    }

    async fn submit_sub_batch(
        &self,
        batch_id: Uuid,
        quotes: &[AggregatedQuote],
    ) -> Result<String, FeedError> {
        let symbols: Vec<String> = quotes.iter().map(|q| q.symbol.clone()).collect();
        let prices: Vec<i64> = quotes.iter().map(|q| scale_price(&q.price)).collect();
        let timestamps: Vec<i64> = quotes.iter().map(|q| q.aggregated_at.timestamp()).collect();
        let confidences: Vec<i64> = quotes.iter().map(|q| q.confidence as i64).collect();

        let script = update_price_batch_script(
            self.chain.oracle_contract(),
            &symbols,
            &prices,
            &timestamps,
            &confidences,
        );
        let tx_hash = self.chain.submit_update(script).await?;
        info!(
            "Batch {} sub-batch of {} quote(s) submitted as {}",
            batch_id,
            quotes.len(),
            tx_hash
        );
        Ok(tx_hash)
    }

    fn attest_sub_batch(
        &self,
        batch_id: Uuid,
        tx_hash: &str,
        quotes: &[AggregatedQuote],
    ) -> Result<(), neofeed_attest::AttestError> {
        let summaries: Vec<PriceSummary> = quotes
            .iter()
            .map(|q| PriceSummary {
                symbol: q.symbol.clone(),
                price: q.price.to_string(),
                confidence: q.confidence,
            })
            .collect();
        let metadata = RunMetadata {
            network: self.config.network.clone(),
            run_id: batch_id.to_string(),
            ..RunMetadata::default()
        };
        self.attestor
            .create_batch(batch_id, tx_hash.to_string(), summaries, metadata)?;
        Ok(())
    }

    /// Move surplus NEP-17 holdings off the TEE account, keeping a GAS
    /// reserve for fees. Signed by the TEE key alone; failures are logged
    /// and never block publishing.
    async fn sweep_assets(&self) -> Result<(), FeedError> {
        let tee_address = self.chain.tee_address().await?;
        let balances = self.chain.token_balances(&tee_address).await?;
        let gas_hash = ScriptHash::from_hex_be(GAS_TOKEN_HASH)
            .map_err(|e| FeedError::Config(format!("bad GAS token hash constant: {e}")))?;

        for balance in balances {
            let amount = if balance.asset_hash == gas_hash {
                balance.amount - GAS_FEE_RESERVE
            } else {
                balance.amount
            };
            if amount <= 0 {
                continue;
            }

            let script = nep17_transfer_script(
                balance.asset_hash,
                self.chain.tee_script_hash(),
                self.chain.master_script_hash(),
                amount,
                "TEE to Master transfer",
            );
            match self.chain.submit_transfer(script).await {
                Ok(tx_hash) => info!(
                    "Swept {} units of {} from {} as {}",
                    amount,
                    balance.asset_hash.to_hex_be(),
                    mask_address(&tee_address),
                    tx_hash
                ),
                Err(e) => warn!(
                    "Sweep of {} failed (continuing): {}",
                    balance.asset_hash.to_hex_be(),
                    e
                ),
            }
        }
        Ok(())
    }

    fn spawn_monitor(&self, batch_id: Uuid) {
        let chain = self.chain.clone();
        let statuses = self.statuses.clone();
        let hashes = self.tx_hashes(batch_id);
        let interval = self.config.poll_interval;
        let attempts = self.config.poll_attempts;

        let handle = tokio::spawn(async move {
            let outcome = monitor_confirmations(chain, &hashes, interval, attempts).await;
            let mut statuses = statuses.write();
            if let Some(info) = statuses.get_mut(&batch_id) {
                if info.status.can_transition_to(outcome) {
                    debug!("Batch {} monitoring finished: {}", batch_id, outcome);
                    info.status = outcome;
                    info.updated_at = Utc::now();
                } else {
                    warn!(
                        "Ignoring monitor outcome {} for batch {} in state {}",
                        outcome, batch_id, info.status
                    );
                }
            }
        });
        self.monitors.lock().push(handle);
    }

    fn reset_failed(&self, batch_id: Uuid) {
        let mut statuses = self.statuses.write();
        if statuses
            .get(&batch_id)
            .is_some_and(|entry| entry.status == BatchStatus::Failed)
        {
            statuses.remove(&batch_id);
            self.tx_hashes.write().remove(&batch_id);
        }
    }

    fn set_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        tx_hash: Option<String>,
        processed: usize,
        total: usize,
    ) {
        let mut statuses = self.statuses.write();
        let entry = statuses
            .entry(batch_id)
            .or_insert_with(|| BatchStatusInfo::unknown(batch_id));
        if entry.status != status && !entry.status.can_transition_to(status) {
            warn!(
                "Refusing status regression {} -> {} for batch {}",
                entry.status, status, batch_id
            );
            return;
        }
        entry.status = status;
        entry.updated_at = Utc::now();
        entry.processed = processed;
        entry.total = total;
        if tx_hash.is_some() {
            entry.tx_hash = tx_hash;
        }
    }
}

/// Poll all sub-batch transactions until every one confirms, the attempt
/// budget runs out (`Pending`), or a poll errors out (`Failed`).
async fn monitor_confirmations(
    chain: Arc<dyn OracleChain>,
    tx_hashes: &[String],
    interval: Duration,
    attempts: u32,
) -> BatchStatus {
    let mut unconfirmed: Vec<&String> = tx_hashes.iter().collect();
    for _ in 0..attempts {
        tokio::time::sleep(interval).await;
        let mut still_waiting = Vec::new();
        for tx_hash in unconfirmed {
            match chain.confirmations(tx_hash).await {
                Ok(count) if count >= 1 => {
                    debug!("Transaction {} confirmed ({}x)", tx_hash, count);
                }
                Ok(_) => still_waiting.push(tx_hash),
                Err(e) => {
                    error!("Confirmation poll failed for {}: {}", tx_hash, e);
                    return BatchStatus::Failed;
                }
            }
        }
        if still_waiting.is_empty() {
            return BatchStatus::Confirmed;
        }
        unconfirmed = still_waiting;
    }
    BatchStatus::Pending
}

/// Scale a decimal price to the contract's 10^8 integer form, truncating
/// toward zero and clamping instead of overflowing.
pub fn scale_price(price: &BigDecimal) -> i64 {
    let max_price = i64::MAX / PRICE_SCALE_FACTOR;
    if *price > BigDecimal::from(max_price) {
        warn!("Price {} exceeds the on-chain range, clamping", price);
        return max_price * PRICE_SCALE_FACTOR;
    }
    (price * BigDecimal::from(PRICE_SCALE_FACTOR))
        .with_scale_round(0, RoundingMode::Down)
        .to_i64()
        .unwrap_or_else(|| {
            warn!("Price {} failed integer conversion, clamping", price);
            max_price * PRICE_SCALE_FACTOR
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn scales_by_ten_to_the_eighth_truncating() {
        let price = BigDecimal::from_str("50000.50").unwrap();
        assert_eq!(scale_price(&price), 5_000_050_000_000);

        let sub_satoshi = BigDecimal::from_str("0.000000019").unwrap();
        assert_eq!(scale_price(&sub_satoshi), 1);

        let fractional = BigDecimal::from_str("4000.2").unwrap();
        assert_eq!(scale_price(&fractional), 400_020_000_000);
    }

    #[test]
    fn clamps_instead_of_overflowing() {
        let huge = BigDecimal::from_str("999999999999999999999").unwrap();
        let clamped = scale_price(&huge);
        assert_eq!(clamped, (i64::MAX / PRICE_SCALE_FACTOR) * PRICE_SCALE_FACTOR);
        assert!(clamped <= i64::MAX);
    }
}
