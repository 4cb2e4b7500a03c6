// Neo N3 chain integration for the neofeed oracle.
//
// Everything on-chain goes through this crate: RPC transport, protocol
// settings discovery, VM script construction, transaction building and the
// dual-signature submission path.

pub mod client;
pub mod error;
pub mod protocol;
pub mod rpc;
pub mod script;
pub mod transaction;
pub mod wallet;

pub use client::{NeoChainClient, OnChainPrice, SigningMode, TokenBalance};
pub use error::ChainError;
pub use protocol::ProtocolSettings;
pub use script::{
    contract_read_script, nep17_transfer_script, update_price_batch_script, CallFlags,
    ContractParameter, ScriptBuilder,
};
pub use transaction::{Signer, Transaction, Witness};
pub use wallet::{KeyPair, ScriptHash};

/// GAS token contract hash on Neo N3 (display form).
pub const GAS_TOKEN_HASH: &str = "0xd2a4cff31913016155e38e474a2c06d08be276cf";

/// NEO token contract hash on Neo N3 (display form).
pub const NEO_TOKEN_HASH: &str = "0xef4073a0f2b305a38ec4050e4d3d28bc40ea63f5";

/// Smallest-unit factor shared by GAS and oracle price scaling.
pub const GAS_FACTOR: i64 = 100_000_000;
