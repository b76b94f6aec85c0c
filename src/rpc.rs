//! Node JSON-RPC access
//!
//! `Node` is the seam between the operator flows and the chain. The live
//! implementation speaks plain JSON-RPC over HTTP; tests substitute a
//! scripted in-memory node.

use crate::errors::{OperatorError, OperatorResult};
use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Receipt fields the operator cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    /// `None` on pre-Byzantium chains, which report no status
    pub status: Option<bool>,
    pub gas_used: Option<u64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status != Some(false)
    }
}

/// Remote procedures the operator needs from a node
#[async_trait]
pub trait Node: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> OperatorResult<u64>;

    /// `eth_getTransactionCount(address, "pending")`
    async fn transaction_count(&self, address: Address) -> OperatorResult<u64>;

    /// `eth_sendRawTransaction`; returns the hash reported by the node
    async fn send_raw_transaction(&self, raw: &[u8]) -> OperatorResult<B256>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is unmined
    async fn transaction_receipt(&self, hash: B256) -> OperatorResult<Option<TxReceipt>>;

    /// Read-only `eth_call` against the latest block
    async fn call(&self, to: Address, data: &[u8]) -> OperatorResult<Bytes>;
}

/// JSON-RPC node client over HTTP(S)
pub struct JsonRpcNode {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcNode {
    pub fn new(url: &str) -> OperatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OperatorError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: serde_json::Value) -> OperatorResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!("RPC -> {} {}", method, payload["params"]);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| OperatorError::from_network_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OperatorError::Http { status, body });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OperatorError::ResponseShape(format!("{} response: {}", method, e)))?;

        parse_rpc_response(method, json)
    }
}

/// Split a JSON-RPC envelope into its `result` or a structured `Rpc` error
fn parse_rpc_response(method: &str, mut json: serde_json::Value) -> OperatorResult<serde_json::Value> {
    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        return Err(OperatorError::Rpc { code, message });
    }

    match json.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(OperatorError::ResponseShape(format!("{} response has no result", method))),
    }
}

#[async_trait]
impl Node for JsonRpcNode {
    async fn chain_id(&self) -> OperatorResult<u64> {
        let result = self.request("eth_chainId", serde_json::json!([])).await?;
        parse_hex_u64(expect_str(&result, "eth_chainId")?)
    }

    async fn transaction_count(&self, address: Address) -> OperatorResult<u64> {
        let result = self
            .request(
                "eth_getTransactionCount",
                serde_json::json!([format!("{:?}", address), "pending"]),
            )
            .await?;
        parse_hex_u64(expect_str(&result, "eth_getTransactionCount")?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> OperatorResult<B256> {
        let result = self
            .request(
                "eth_sendRawTransaction",
                serde_json::json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        parse_b256(expect_str(&result, "eth_sendRawTransaction")?)
    }

    async fn transaction_receipt(&self, hash: B256) -> OperatorResult<Option<TxReceipt>> {
        let result = self
            .request("eth_getTransactionReceipt", serde_json::json!([format!("{:?}", hash)]))
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        let raw: RawReceipt = serde_json::from_value(result)
            .map_err(|e| OperatorError::ResponseShape(format!("receipt: {}", e)))?;
        raw.into_receipt().map(Some)
    }

    async fn call(&self, to: Address, data: &[u8]) -> OperatorResult<Bytes> {
        let result = self
            .request(
                "eth_call",
                serde_json::json!([{
                    "to": format!("{:?}", to),
                    "data": format!("0x{}", hex::encode(data)),
                }, "latest"]),
            )
            .await?;
        parse_bytes(expect_str(&result, "eth_call")?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
}

impl RawReceipt {
    fn into_receipt(self) -> OperatorResult<TxReceipt> {
        let status = match self.status.as_deref() {
            Some(s) => Some(parse_hex_u64(s)? == 1),
            None => None,
        };
        Ok(TxReceipt {
            transaction_hash: parse_b256(&self.transaction_hash)?,
            block_number: self.block_number.as_deref().map(parse_hex_u64).transpose()?,
            status,
            gas_used: self.gas_used.as_deref().map(parse_hex_u64).transpose()?,
        })
    }
}

fn expect_str<'a>(value: &'a serde_json::Value, method: &str) -> OperatorResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| OperatorError::ResponseShape(format!("{} result is not a string: {}", method, value)))
}

/// Parse a 0x-prefixed quantity
pub(crate) fn parse_hex_u64(s: &str) -> OperatorResult<u64> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(hex_str, 16)
        .map_err(|e| OperatorError::ResponseShape(format!("invalid quantity {:?}: {}", s, e)))
}

fn parse_b256(s: &str) -> OperatorResult<B256> {
    s.parse::<B256>()
        .map_err(|e| OperatorError::ResponseShape(format!("invalid hash {:?}: {}", s, e)))
}

fn parse_bytes(s: &str) -> OperatorResult<Bytes> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(hex_str)
        .map(Bytes::from)
        .map_err(|e| OperatorError::ResponseShape(format!("invalid data {:?}: {}", s, e)))
}
