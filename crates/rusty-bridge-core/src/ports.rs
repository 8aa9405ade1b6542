use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::chain::ChainName;
use crate::domain::{
    BridgeHistoryEntry, BridgeToken, ContractCall, OrderRecord, RelaySwap, RelaySwapRequest, RelaySwapStatus,
    RelayToken, TxReceipt,
};
use crate::bridge::BridgeTransaction;

/// EIP-1193 "User Rejected Request".
pub const USER_REJECT_ERROR_CODE: i64 = 4001;
/// EIP-1193 "Unrecognized chain ID" returned by `wallet_switchEthereumChain`.
pub const UNRECOGNIZED_CHAIN_ERROR_CODE: i64 = 4902;
/// EIP-1474 "Resource unavailable"; MetaMask uses it for a pending permission prompt.
pub const REQUEST_PENDING_ERROR_CODE: i64 = -32002;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("timed out: {0}")]
    Timeout(String),
}

impl PortError {
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            PortError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Events pushed by the wallet itself, independent of who initiated them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
    Disconnect,
}

pub type WalletEventSink = Arc<dyn Fn(WalletEvent) + Send + Sync>;

/// The external wallet object (injected extension, relay session, QR session).
#[async_trait]
pub trait WalletHandle: Send + Sync {
    fn is_available(&self) -> bool;
    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError>;
    fn listen(&self, sink: WalletEventSink) -> Result<(), PortError>;
    async fn close(&self) -> Result<(), PortError> {
        Ok(())
    }
}

#[async_trait]
pub trait ChainRpcPort: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<U256, PortError>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, PortError>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, PortError>;
    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<U256, PortError>;
}

pub trait AbiPort: Send + Sync {
    fn encode_call(&self, call: &ContractCall) -> Result<Bytes, PortError>;
    fn decode_output(&self, call: &ContractCall, data: &[u8]) -> Result<Vec<Value>, PortError>;
}

pub trait SessionStorePort: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, PortError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PortError>;
    fn delete(&self, key: &str) -> Result<(), PortError>;
}

pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> Result<u64, PortError>;
}

/// Panama-style relay network: custody deposit address, backend-driven payout.
#[async_trait]
pub trait RelayServicePort: Send + Sync {
    async fn tokens(&self) -> Result<Vec<RelayToken>, PortError>;
    async fn network_fee(&self, symbol: &str, network: ChainName) -> Result<String, PortError>;
    async fn create_swap(&self, request: &RelaySwapRequest) -> Result<RelaySwap, PortError>;
    async fn swap_status(&self, swap_id: &str) -> Result<RelaySwapStatus, PortError>;
}

#[async_trait]
pub trait TokenCatalogPort: Send + Sync {
    async fn bridge_tokens(
        &self,
        from: ChainName,
        to: ChainName,
    ) -> Result<Vec<BridgeToken>, PortError>;
}

#[async_trait]
pub trait BridgeHistoryPort: Send + Sync {
    async fn record(&self, transaction: &BridgeTransaction) -> Result<(), PortError>;
    async fn transactions(&self, user: Address) -> Result<Vec<BridgeHistoryEntry>, PortError>;
}

/// Checkpoint service of a sidechain whose withdrawals are claimed on the
/// root chain once the burn block is committed there.
#[async_trait]
pub trait CheckpointPort: Send + Sync {
    /// Whether `block` of the sidechain `network` is covered by a checkpoint.
    async fn is_checkpointed(&self, network: ChainName, block: u64) -> Result<bool, PortError>;
    /// Proof the root contract's `exit` takes for the burn in `burn_tx`.
    async fn exit_payload(&self, network: ChainName, burn_tx: B256) -> Result<Bytes, PortError>;
}

#[async_trait]
pub trait OrderBookApiPort: Send + Sync {
    async fn create_trade(&self, record: &OrderRecord) -> Result<(), PortError>;
    async fn trade(&self, unique_link: &str) -> Result<OrderRecord, PortError>;
}
