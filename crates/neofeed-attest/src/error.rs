// src/error.rs - Attestation error types
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttestError {
    #[error("Attestation I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Attestation serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid attestation record: {0}")]
    InvalidRecord(String),
}
