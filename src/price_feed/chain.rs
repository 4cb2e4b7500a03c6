// src/price_feed/chain.rs - Seam between the publisher and the Neo client
use async_trait::async_trait;

use neofeed_chain::{NeoChainClient, ScriptHash, SigningMode, TokenBalance};

use crate::price_feed::types::FeedError;

/// The publisher's view of the chain. Kept narrow so tests can stand in a
/// mock without touching RPC.
#[async_trait]
pub trait OracleChain: Send + Sync {
    /// Submit a script dual-signed by the TEE and Master keys.
    async fn submit_update(&self, script: Vec<u8>) -> Result<String, FeedError>;

    /// Submit a script signed by the TEE key alone (asset sweeps).
    async fn submit_transfer(&self, script: Vec<u8>) -> Result<String, FeedError>;

    /// Confirmation count for a submitted transaction.
    async fn confirmations(&self, tx_hash: &str) -> Result<u32, FeedError>;

    /// NEP-17 balances of an account.
    async fn token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, FeedError>;

    fn oracle_contract(&self) -> ScriptHash;
    fn tee_script_hash(&self) -> ScriptHash;
    fn master_script_hash(&self) -> ScriptHash;

    async fn tee_address(&self) -> Result<String, FeedError>;
}

#[async_trait]
impl OracleChain for NeoChainClient {
    async fn submit_update(&self, script: Vec<u8>) -> Result<String, FeedError> {
        Ok(self.submit_script(script, SigningMode::Dual).await?)
    }

    async fn submit_transfer(&self, script: Vec<u8>) -> Result<String, FeedError> {
        Ok(self.submit_script(script, SigningMode::TeeOnly).await?)
    }

    async fn confirmations(&self, tx_hash: &str) -> Result<u32, FeedError> {
        Ok(self.transaction_confirmations(tx_hash).await?)
    }

    async fn token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, FeedError> {
        Ok(NeoChainClient::token_balances(self, address).await?)
    }

    fn oracle_contract(&self) -> ScriptHash {
        NeoChainClient::oracle_contract(self)
    }

    fn tee_script_hash(&self) -> ScriptHash {
        NeoChainClient::tee_script_hash(self)
    }

    fn master_script_hash(&self) -> ScriptHash {
        NeoChainClient::master_script_hash(self)
    }

    async fn tee_address(&self) -> Result<String, FeedError> {
        Ok(NeoChainClient::tee_address(self).await?)
    }
}
