// src/error.rs - Chain client error types
use thiserror::Error;

/// Errors produced by the Neo N3 chain client.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("Script execution faulted: {0}")]
    VmFault(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid script hash: {0}")]
    InvalidScriptHash(String),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("No signing key available for signer {0}")]
    MissingKey(String),
}

impl ChainError {
    /// True for failures worth retrying at a higher layer (network hiccups,
    /// node-side errors), false for deterministic rejections.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Transport(_) => true,
            ChainError::Rpc { code, .. } => *code == -500 || *code == -400,
            ChainError::MalformedResponse(_) => true,
            _ => false,
        }
    }
}
