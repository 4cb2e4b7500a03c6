// src/client.rs - High-level Neo N3 chain client owned by the oracle
use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::protocol::ProtocolSettings;
use crate::rpc::{NeoRpcClient, StackItem};
use crate::script::{contract_read_script, ContractParameter};
use crate::transaction::{Signer, Transaction, DEFAULT_VALID_UNTIL_DELTA};
use crate::wallet::{KeyPair, ScriptHash};

/// Which key set witnesses a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    /// TEE witness first, Master (fee payer) second.
    Dual,
    /// TEE key alone; used for asset sweeps off the TEE account.
    TeeOnly,
}

/// A single NEP-17 balance entry for an account.
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub asset_hash: ScriptHash,
    pub amount: i64,
}

/// On-chain price record returned by the oracle contract's read interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainPrice {
    pub price: i64,
    pub timestamp: i64,
    pub confidence: i64,
}

/// The oracle's connection to a Neo N3 node.
///
/// Owns the RPC handle, the lazily captured [`ProtocolSettings`] and both
/// signing keys. Keys are loaded once and only ever used here.
pub struct NeoChainClient {
    rpc: NeoRpcClient,
    protocol: OnceCell<ProtocolSettings>,
    oracle_contract: ScriptHash,
    tee_key: KeyPair,
    master_key: KeyPair,
}

impl NeoChainClient {
    pub fn new(
        endpoint: impl Into<String>,
        oracle_contract: ScriptHash,
        tee_key: KeyPair,
        master_key: KeyPair,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            rpc: NeoRpcClient::new(endpoint)?,
            protocol: OnceCell::new(),
            oracle_contract,
            tee_key,
            master_key,
        })
    }

    /// Protocol settings, fetched from `getversion` on first use. The
    /// OnceCell collapses concurrent initializers into a single RPC call.
    pub async fn protocol(&self) -> Result<&ProtocolSettings, ChainError> {
        self.protocol
            .get_or_try_init(|| async {
                let version = self.rpc.get_version().await?;
                let settings = ProtocolSettings::from(version);
                info!(
                    "Connected to Neo network magic {} (address version {:#04x})",
                    settings.network_magic, settings.address_version
                );
                Ok(settings)
            })
            .await
    }

    pub fn oracle_contract(&self) -> ScriptHash {
        self.oracle_contract
    }

    pub fn tee_script_hash(&self) -> ScriptHash {
        self.tee_key.script_hash()
    }

    pub fn master_script_hash(&self) -> ScriptHash {
        self.master_key.script_hash()
    }

    pub async fn tee_address(&self) -> Result<String, ChainError> {
        let protocol = self.protocol().await?;
        Ok(self.tee_key.address(protocol.address_version))
    }

    pub async fn master_address(&self) -> Result<String, ChainError> {
        let protocol = self.protocol().await?;
        Ok(self.master_key.address(protocol.address_version))
    }

    fn signers_for(&self, mode: SigningMode) -> Vec<Signer> {
        match mode {
            SigningMode::Dual => vec![
                Signer::called_by_entry_restricted(
                    self.tee_key.script_hash(),
                    vec![self.oracle_contract],
                ),
                Signer::called_by_entry_restricted(
                    self.master_key.script_hash(),
                    vec![self.oracle_contract],
                ),
            ],
            SigningMode::TeeOnly => vec![Signer::called_by_entry(self.tee_key.script_hash())],
        }
    }

    fn keys_for(&self, mode: SigningMode) -> Vec<&KeyPair> {
        match mode {
            SigningMode::Dual => vec![&self.tee_key, &self.master_key],
            SigningMode::TeeOnly => vec![&self.tee_key],
        }
    }

    fn invoke_signer_params(signers: &[Signer]) -> Vec<Value> {
        signers
            .iter()
            .map(|s| json!({"account": s.account.to_hex_be(), "scopes": "CalledByEntry"}))
            .collect()
    }

    /// Build, sign and submit a transaction running `script`.
    ///
    /// The system fee comes from a dry-run `invokescript` (a FAULT state is
    /// a rejection, not a fee), the network fee from
    /// `calculatenetworkfee` over a placeholder-witnessed serialization.
    /// Returns the node-assigned transaction hash.
    pub async fn submit_script(
        &self,
        script: Vec<u8>,
        mode: SigningMode,
    ) -> Result<String, ChainError> {
        let protocol = self.protocol().await?.clone();
        let signers = self.signers_for(mode);
        let keys = self.keys_for(mode);

        let invoke = self
            .rpc
            .invoke_script(&script, Self::invoke_signer_params(&signers))
            .await?;
        if !invoke.halted() {
            let reason = invoke
                .exception
                .unwrap_or_else(|| format!("VM state {}", invoke.state));
            return Err(ChainError::VmFault(reason));
        }

        let block_count = self.rpc.get_block_count().await?;
        let mut tx = Transaction::new(
            script,
            signers,
            block_count + DEFAULT_VALID_UNTIL_DELTA,
        );
        tx.system_fee = invoke.gas_consumed();

        tx.attach_placeholder_witnesses(&keys)?;
        tx.network_fee = self.rpc.calculate_network_fee(&tx.serialize()).await?;

        tx.sign(protocol.network_magic, &keys)?;
        debug!(
            "Submitting tx {} (sysfee {}, netfee {})",
            tx.hash_hex(),
            tx.system_fee,
            tx.network_fee
        );

        let hash = self.rpc.send_raw_transaction(&tx.serialize()).await?;
        Ok(hash)
    }

    /// Confirmation count for a submitted transaction; zero while it sits
    /// in the mempool.
    pub async fn transaction_confirmations(&self, tx_hash: &str) -> Result<u32, ChainError> {
        let raw = self.rpc.get_raw_transaction(tx_hash).await?;
        Ok(raw.confirmations)
    }

    /// NEP-17 balances held by `address`. Entries with malformed amounts
    /// are skipped with a warning rather than failing the sweep.
    pub async fn token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ChainError> {
        let reply = self.rpc.get_nep17_balances(address).await?;
        let mut balances = Vec::with_capacity(reply.balance.len());
        for entry in reply.balance {
            let asset_hash = match ScriptHash::from_hex_be(&entry.asset_hash) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Skipping balance with bad asset hash: {e}");
                    continue;
                }
            };
            let amount: i64 = match entry.amount.parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(
                        "Skipping balance of {} with non-numeric amount {}",
                        entry.asset_hash, entry.amount
                    );
                    continue;
                }
            };
            balances.push(TokenBalance { asset_hash, amount });
        }
        Ok(balances)
    }

    async fn read_contract(
        &self,
        method: &str,
        args: &[ContractParameter],
    ) -> Result<StackItem, ChainError> {
        let script = contract_read_script(self.oracle_contract, method, args);
        let invoke = self.rpc.invoke_script(&script, vec![]).await?;
        if !invoke.halted() {
            return Err(ChainError::VmFault(
                invoke
                    .exception
                    .unwrap_or_else(|| format!("{method}: VM state {}", invoke.state)),
            ));
        }
        invoke
            .stack
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::MalformedResponse(format!("{method}: empty result stack")))
    }

    /// Current stored price for `symbol` (observability helper).
    pub async fn get_price(&self, symbol: &str) -> Result<i64, ChainError> {
        let item = self
            .read_contract("getPrice", &[ContractParameter::string(symbol)])
            .await?;
        parse_integer(&item)
    }

    /// Full on-chain price record for `symbol`.
    pub async fn get_price_data(&self, symbol: &str) -> Result<OnChainPrice, ChainError> {
        let item = self
            .read_contract("getPriceData", &[ContractParameter::string(symbol)])
            .await?;
        let fields = item
            .value
            .as_array()
            .ok_or_else(|| ChainError::MalformedResponse("getPriceData: not a struct".into()))?;
        if fields.len() < 3 {
            return Err(ChainError::MalformedResponse(format!(
                "getPriceData: expected 3 fields, got {}",
                fields.len()
            )));
        }
        let field = |index: usize| -> Result<i64, ChainError> {
            let item: StackItem = serde_json::from_value(fields[index].clone())
                .map_err(|e| ChainError::MalformedResponse(format!("getPriceData: {e}")))?;
            parse_integer(&item)
        };
        Ok(OnChainPrice {
            price: field(0)?,
            timestamp: field(1)?,
            confidence: field(2)?,
        })
    }

    /// Whether the oracle contract is paused.
    pub async fn is_paused(&self) -> Result<bool, ChainError> {
        let item = self.read_contract("isPaused", &[]).await?;
        parse_boolean(&item)
    }

    /// Contract owner rendered as an address.
    pub async fn get_owner(&self) -> Result<String, ChainError> {
        let protocol = self.protocol().await?;
        let item = self.read_contract("getOwner", &[]).await?;
        let bytes = parse_byte_string(&item)?;
        if bytes.len() != 20 {
            return Err(ChainError::MalformedResponse(format!(
                "getOwner: expected 20-byte account, got {}",
                bytes.len()
            )));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(ScriptHash(hash).to_address(protocol.address_version))
    }

    /// Whether `address` is registered as an oracle on the contract.
    pub async fn is_oracle(&self, address: &str) -> Result<bool, ChainError> {
        let protocol = self.protocol().await?;
        let account = ScriptHash::from_address(address, protocol.address_version)?;
        let item = self
            .read_contract("isOracle", &[ContractParameter::Hash160(account)])
            .await?;
        parse_boolean(&item)
    }
}

fn parse_integer(item: &StackItem) -> Result<i64, ChainError> {
    match item.item_type.as_str() {
        "Integer" => item
            .value
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| item.value.as_i64())
            .ok_or_else(|| {
                ChainError::MalformedResponse(format!("non-numeric Integer item: {}", item.value))
            }),
        other => Err(ChainError::MalformedResponse(format!(
            "expected Integer stack item, got {other}"
        ))),
    }
}

fn parse_boolean(item: &StackItem) -> Result<bool, ChainError> {
    match item.item_type.as_str() {
        "Boolean" => item.value.as_bool().ok_or_else(|| {
            ChainError::MalformedResponse(format!("non-bool Boolean item: {}", item.value))
        }),
        // Contracts occasionally return integers for flags.
        "Integer" => Ok(parse_integer(item)? != 0),
        other => Err(ChainError::MalformedResponse(format!(
            "expected Boolean stack item, got {other}"
        ))),
    }
}

fn parse_byte_string(item: &StackItem) -> Result<Vec<u8>, ChainError> {
    match item.item_type.as_str() {
        "ByteString" | "Buffer" => {
            let encoded = item.value.as_str().ok_or_else(|| {
                ChainError::MalformedResponse("ByteString item without string value".into())
            })?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| ChainError::MalformedResponse(format!("bad base64 payload: {e}")))
        }
        other => Err(ChainError::MalformedResponse(format!(
            "expected ByteString stack item, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(item_type: &str, value: Value) -> StackItem {
        serde_json::from_value(json!({"type": item_type, "value": value})).unwrap()
    }

    #[test]
    fn parses_integer_stack_items() {
        assert_eq!(
            parse_integer(&item("Integer", json!("5000050000000"))).unwrap(),
            5_000_050_000_000
        );
        assert!(parse_integer(&item("ByteString", json!("AAA="))).is_err());
    }

    #[test]
    fn parses_boolean_stack_items() {
        assert!(parse_boolean(&item("Boolean", json!(true))).unwrap());
        assert!(!parse_boolean(&item("Integer", json!("0"))).unwrap());
        assert!(parse_boolean(&item("Array", json!([]))).is_err());
    }

    #[test]
    fn parses_byte_string_stack_items() {
        let bytes = parse_byte_string(&item("ByteString", json!("bmVvZmVlZA=="))).unwrap();
        assert_eq!(bytes, b"neofeed");
    }
}
