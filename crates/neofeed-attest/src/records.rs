// src/records.rs - Attestation record types and the shared signature scheme
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AttestError;

/// Non-secret metadata describing the run that produced a receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMetadata {
    pub service_version: String,
    pub network: String,
    pub run_id: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            network: "unknown".to_string(),
            run_id: "manual".to_string(),
        }
    }
}

/// Receipt written once when the TEE identity is provisioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountAttestation {
    #[serde(rename = "type")]
    pub attestation_type: String,
    pub account_address: String,
    pub created_at: DateTime<Utc>,
    pub run_metadata: RunMetadata,
    pub signature: String,
}

/// Per-symbol summary mirrored from a published sub-batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceSummary {
    pub symbol: String,
    pub price: String,
    pub confidence: u8,
}

/// Receipt written for every sub-batch accepted by the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchAttestation {
    #[serde(rename = "type")]
    pub attestation_type: String,
    pub batch_id: Uuid,
    pub tx_hash: String,
    pub price_count: usize,
    pub price_summaries: Vec<PriceSummary>,
    pub timestamp: DateTime<Utc>,
    pub run_metadata: RunMetadata,
    pub signature: String,
}

pub const ACCOUNT_ATTESTATION_TYPE: &str = "account_generation";
pub const BATCH_ATTESTATION_TYPE: &str = "price_feed_update";

/// The `|`-separated secret triplet mixed into every signature, sourced
/// from the runtime environment at startup.
#[derive(Debug, Clone)]
pub struct RunSecret {
    pub build_commit: String,
    pub run_actor: String,
    pub run_token: String,
}

impl RunSecret {
    fn suffix(&self) -> String {
        format!("|{}|{}|{}", self.build_commit, self.run_actor, self.run_token)
    }
}

/// Anything signable under the shared scheme: canonical JSON with an empty
/// signature field, plus the run secret, hashed with SHA-256.
pub trait Attestation: Serialize + Clone {
    fn signature(&self) -> &str;
    fn set_signature(&mut self, signature: String);

    fn compute_signature(&self, secret: &RunSecret) -> Result<String, AttestError> {
        let mut unsigned = self.clone();
        unsigned.set_signature(String::new());
        let canonical = serde_json::to_string(&unsigned)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher.update(secret.suffix().as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    fn verify(&self, secret: &RunSecret) -> Result<bool, AttestError> {
        Ok(self.compute_signature(secret)? == self.signature())
    }
}

impl Attestation for AccountAttestation {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn set_signature(&mut self, signature: String) {
        self.signature = signature;
    }
}

impl Attestation for BatchAttestation {
    fn signature(&self) -> &str {
        &self.signature
    }

    fn set_signature(&mut self, signature: String) {
        self.signature = signature;
    }
}

impl AccountAttestation {
    pub fn new(account_address: String, created_at: DateTime<Utc>, run_metadata: RunMetadata) -> Self {
        Self {
            attestation_type: ACCOUNT_ATTESTATION_TYPE.to_string(),
            account_address,
            created_at,
            run_metadata,
            signature: String::new(),
        }
    }
}

impl BatchAttestation {
    pub fn new(
        batch_id: Uuid,
        tx_hash: String,
        price_summaries: Vec<PriceSummary>,
        timestamp: DateTime<Utc>,
        run_metadata: RunMetadata,
    ) -> Self {
        Self {
            attestation_type: BATCH_ATTESTATION_TYPE.to_string(),
            batch_id,
            tx_hash,
            price_count: price_summaries.len(),
            price_summaries,
            timestamp,
            run_metadata,
            signature: String::new(),
        }
    }
}
