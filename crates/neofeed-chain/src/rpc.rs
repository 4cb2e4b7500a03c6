// src/rpc.rs - JSON-RPC 2.0 client for a Neo N3 node
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ChainError;
use crate::protocol::VersionReply;

const RPC_TIMEOUT_SECS: u64 = 15;

/// Thin JSON-RPC binding over the node methods the oracle needs. The wire
/// shape stays in this module; callers deal in logical operations only.
pub struct NeoRpcClient {
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `invokescript` reply: VM halt state, gas consumed and result stack.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResult {
    pub state: String,
    pub gasconsumed: String,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub stack: Vec<StackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub value: Value,
}

impl InvokeResult {
    pub fn halted(&self) -> bool {
        self.state.contains("HALT")
    }

    /// Gas consumed in datoshi; malformed values count as zero.
    pub fn gas_consumed(&self) -> i64 {
        self.gasconsumed.parse().unwrap_or(0)
    }
}

/// One verbose `getrawtransaction` reply, reduced to what the poller reads.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub blockhash: Option<String>,
}

/// `getnep17balances` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct Nep17Balances {
    pub address: String,
    #[serde(default)]
    pub balance: Vec<Nep17Balance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Nep17Balance {
    #[serde(rename = "assethash")]
    pub asset_hash: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
struct SendResult {
    hash: String,
}

impl NeoRpcClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChainError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .user_agent("neofeed/0.1")
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("RPC call {} (id {})", method, id);

        let response = self.http.post(&self.endpoint).json(&payload).send().await?;
        let envelope: RpcEnvelope<T> = response.json().await?;

        if let Some(error) = envelope.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope.result.ok_or_else(|| {
            ChainError::MalformedResponse(format!("{method}: missing result field"))
        })
    }

    pub async fn get_version(&self) -> Result<VersionReply, ChainError> {
        self.call("getversion", json!([])).await
    }

    pub async fn get_block_count(&self) -> Result<u32, ChainError> {
        self.call("getblockcount", json!([])).await
    }

    /// Dry-run a script to obtain VM state and the system fee.
    pub async fn invoke_script(
        &self,
        script: &[u8],
        signer_params: Vec<Value>,
    ) -> Result<InvokeResult, ChainError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(script);
        self.call("invokescript", json!([encoded, signer_params]))
            .await
    }

    /// Ask the node to price the network fee for a serialized transaction
    /// (witness placeholders included).
    pub async fn calculate_network_fee(&self, raw_tx: &[u8]) -> Result<i64, ChainError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw_tx);
        #[derive(Deserialize)]
        struct FeeReply {
            networkfee: String,
        }
        let reply: FeeReply = self.call("calculatenetworkfee", json!([encoded])).await?;
        reply.networkfee.parse().map_err(|_| {
            ChainError::MalformedResponse(format!(
                "calculatenetworkfee: non-numeric fee {}",
                reply.networkfee
            ))
        })
    }

    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String, ChainError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw_tx);
        let reply: SendResult = self.call("sendrawtransaction", json!([encoded])).await?;
        Ok(reply.hash)
    }

    pub async fn get_raw_transaction(&self, tx_hash: &str) -> Result<RawTransaction, ChainError> {
        self.call("getrawtransaction", json!([tx_hash, true])).await
    }

    pub async fn get_nep17_balances(&self, address: &str) -> Result<Nep17Balances, ChainError> {
        self.call("getnep17balances", json!([address])).await
    }
}
