use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use rusty_bridge_core::contracts::ChainClients;
use rusty_bridge_core::domain::LogEntry;
use rusty_bridge_core::{AbiPort, ChainRegistry, ChainRpcPort, PortError, TxReceipt};

use crate::handle::rpc_error;

/// Plain JSON-RPC client for one chain's node.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("rpc client build failed: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("{method} json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!("{method} status {status}: {body}")));
        }
        if let Some(err) = body.get("error") {
            return Err(rpc_error(err));
        }
        debug!(method, id, "rpc answered");
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport(format!("{method} missing result")))
    }
}

fn hex_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, PortError> {
    value
        .as_str()
        .ok_or_else(|| PortError::Validation(format!("{field}: expected hex string, got {value}")))
}

fn parse_quantity(value: &Value, field: &str) -> Result<U256, PortError> {
    let raw = hex_str(value, field)?;
    U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| PortError::Validation(format!("{field}: {e}")))
}

fn parse_receipt(value: &Value) -> Result<TxReceipt, PortError> {
    let transaction_hash = B256::from_str(hex_str(&value["transactionHash"], "transactionHash")?)
        .map_err(|e| PortError::Validation(format!("transactionHash: {e}")))?;
    let status = parse_quantity(&value["status"], "status")? == U256::from(1u8);
    let block_number = match &value["blockNumber"] {
        Value::Null => None,
        raw => Some(parse_quantity(raw, "blockNumber")?.saturating_to::<u64>()),
    };
    let logs = value["logs"]
        .as_array()
        .map(|logs| logs.iter().map(parse_log).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    Ok(TxReceipt {
        transaction_hash,
        status,
        block_number,
        logs,
    })
}

fn parse_log(value: &Value) -> Result<LogEntry, PortError> {
    let address = Address::from_str(hex_str(&value["address"], "log.address")?)
        .map_err(|e| PortError::Validation(format!("log.address: {e}")))?;
    let topics = value["topics"]
        .as_array()
        .ok_or_else(|| PortError::Validation("log.topics: expected array".to_owned()))?
        .iter()
        .map(|t| {
            B256::from_str(hex_str(t, "log.topic")?)
                .map_err(|e| PortError::Validation(format!("log.topic: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data = Bytes::from_str(hex_str(&value["data"], "log.data")?)
        .map_err(|e| PortError::Validation(format!("log.data: {e}")))?;
    Ok(LogEntry {
        address,
        topics,
        data,
    })
}

#[async_trait]
impl ChainRpcPort for JsonRpcClient {
    async fn native_balance(&self, owner: Address) -> Result<U256, PortError> {
        let raw = self
            .request("eth_getBalance", json!([owner.to_checksum(None), "latest"]))
            .await?;
        parse_quantity(&raw, "balance")
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, PortError> {
        let raw = self
            .request(
                "eth_call",
                json!([{ "to": to.to_checksum(None), "data": data.to_string() }, "latest"]),
            )
            .await?;
        Bytes::from_str(hex_str(&raw, "eth_call")?)
            .map_err(|e| PortError::Validation(format!("eth_call: {e}")))
    }

    async fn gas_price(&self) -> Result<U256, PortError> {
        let raw = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&raw, "gasPrice")
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, PortError> {
        let raw = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        parse_receipt(&raw).map(Some)
    }
}

/// One RPC client per EVM chain in the registry.
pub fn connect_all(
    chains: &ChainRegistry,
    abi: Arc<dyn AbiPort>,
    timeout: Duration,
) -> Result<ChainClients, PortError> {
    let mut clients = ChainClients::new(abi);
    for chain in chains.iter().filter(|c| c.name.is_evm()) {
        let rpc = JsonRpcClient::new(chain.rpc_endpoint.clone(), timeout)?;
        clients = clients.with_chain(chain.name, Arc::new(rpc));
    }
    Ok(clients)
}
