//! Ethereum JSON-RPC reader
//!
//! Transaction status comes from the receipt when there is one; without a
//! receipt the node is asked whether it knows the transaction at all.
//! Balances are read with a plain ERC-20 `balanceOf` call.

use async_trait::async_trait;
use order_book::chain::{BlockchainReader, ChainError, TxStatus};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

/// `balanceOf(address)` selector
const BALANCE_OF: &str = "70a08231";

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("{method}: transport error: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method}: http status {status}")]
    Status {
        method: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{method}: node returned {message} ({code})")]
    Node {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<RpcError> for ChainError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport { .. } | RpcError::Status { .. } => ChainError::Transport(err.to_string()),
            RpcError::Node { .. } => ChainError::Rpc(err.to_string()),
            RpcError::Decode(reason) => ChainError::Decode(reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<String>,
    block_number: Option<String>,
}

#[derive(Clone)]
pub struct JsonRpcReader {
    http_client: Client,
    url: String,
}

impl JsonRpcReader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            url: url.into(),
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let res = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| RpcError::Transport { method, source })?;

        let status = res.status();
        if !status.is_success() {
            return Err(RpcError::Status { method, status });
        }
        let response: RpcResponse = res
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))?;
        if let Some(error) = response.error {
            return Err(RpcError::Node {
                method,
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }
}

#[async_trait]
impl BlockchainReader for JsonRpcReader {
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, ChainError> {
        let receipt = self.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if !receipt.is_null() {
            let receipt: Receipt =
                serde_json::from_value(receipt).map_err(|e| RpcError::Decode(format!("receipt: {e}")))?;
            let status = receipt_status(&receipt)?;
            info!(tx_hash, %status, block = receipt.block_number.as_deref().unwrap_or("?"), "transaction mined");
            return Ok(status);
        }

        let tx = self.call("eth_getTransactionByHash", json!([tx_hash])).await?;
        if tx.is_null() {
            warn!(tx_hash, "transaction not found yet");
            return Ok(TxStatus::NotFound);
        }
        debug!(tx_hash, "transaction is pending");
        Ok(TxStatus::Pending)
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<Decimal, ChainError> {
        let data = balance_of_calldata(address)?;
        let result = self
            .call("eth_call", json!([{ "to": token, "data": data }, "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| RpcError::Decode(format!("eth_call returned {result}")))?;
        Ok(parse_quantity(raw)?)
    }
}

fn receipt_status(receipt: &Receipt) -> Result<TxStatus, RpcError> {
    match receipt.status.as_deref() {
        Some("0x1") => Ok(TxStatus::Success),
        Some("0x0") => Ok(TxStatus::Failure),
        other => Err(RpcError::Decode(format!("receipt status {other:?}"))),
    }
}

fn balance_of_calldata(address: &str) -> Result<String, RpcError> {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RpcError::Decode(format!("invalid address {address}")));
    }
    Ok(format!("0x{BALANCE_OF}{:0>64}", hex.to_ascii_lowercase()))
}

/// Hex quantity to decimal; values beyond the decimal range are rejected
fn parse_quantity(raw: &str) -> Result<Decimal, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw).trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let too_large = || RpcError::Decode(format!("quantity {raw} out of range"));
    if digits.len() > 32 {
        return Err(too_large());
    }
    let value = u128::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("quantity {raw}: {e}")))?;
    Decimal::from_u128(value).ok_or_else(too_large)
}
