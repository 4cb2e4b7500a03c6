// Tamper-evident attestation receipts for neofeed oracle runs.
//
// Two receipt flavors share one signature scheme: the one-off account
// attestation written at identity provisioning, and a batch attestation
// written for every sub-batch accepted on-chain. Signatures mix the record
// body with a run secret sourced from the environment, so a receipt can be
// re-verified for as long as the secrets are stable.

pub mod error;
pub mod records;
pub mod store;

pub use error::AttestError;
pub use records::{
    AccountAttestation, Attestation, BatchAttestation, PriceSummary, RunMetadata, RunSecret,
    ACCOUNT_ATTESTATION_TYPE, BATCH_ATTESTATION_TYPE,
};
pub use store::AttestationService;
