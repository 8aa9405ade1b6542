//! Contract ABIs the bridge and order-book flows call, plus a thin read client.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde_json::Value;

use crate::chain::ChainName;
use crate::domain::{ContractCall, TxReceipt};
use crate::error::Error;
use crate::ports::{AbiPort, ChainRpcPort};

pub const ERC20_ABI: &str = r#"[
  {"type":"function","name":"decimals","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"uint8"}]},
  {"type":"function","name":"balanceOf","stateMutability":"view","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"allowance","stateMutability":"view","inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"approve","stateMutability":"nonpayable","inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"transfer","stateMutability":"nonpayable","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}
]"#;

pub const LOCK_MINT_ABI: &str = r#"[
  {"type":"function","name":"transferToOtherBlockchain","stateMutability":"payable","inputs":[{"name":"blockchain","type":"uint256"},{"name":"amount","type":"uint256"},{"name":"newAddress","type":"string"}],"outputs":[]},
  {"type":"function","name":"isSwapped","stateMutability":"view","inputs":[{"name":"id","type":"bytes32"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"isCancelled","stateMutability":"view","inputs":[{"name":"id","type":"bytes32"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"exit","stateMutability":"nonpayable","inputs":[{"name":"inputData","type":"bytes"}],"outputs":[]}
]"#;

pub const ORDER_BOOK_ABI: &str = r#"[
  {"type":"function","name":"createOrder","stateMutability":"payable","inputs":[{"name":"_baseAddress","type":"address"},{"name":"_quoteAddress","type":"address"},{"name":"_baseLimit","type":"uint256"},{"name":"_quoteLimit","type":"uint256"},{"name":"_expirationTimestamp","type":"uint256"},{"name":"_whitelist","type":"address"},{"name":"_minBaseWei","type":"uint256"},{"name":"_minQuoteWei","type":"uint256"},{"name":"_brokerAddress","type":"address"},{"name":"_brokerBasePercent","type":"uint256"},{"name":"_brokerQuotePercent","type":"uint256"}],"outputs":[]},
  {"type":"function","name":"feeAmount","stateMutability":"view","inputs":[],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"isSwapped","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"isCancelled","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"bool"}]},
  {"type":"function","name":"baseRaised","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"quoteRaised","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"uint256"}]},
  {"type":"function","name":"baseInvestors","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"address[]"}]},
  {"type":"function","name":"quoteInvestors","stateMutability":"view","inputs":[{"name":"_id","type":"bytes32"}],"outputs":[{"name":"","type":"address[]"}]},
  {"type":"event","name":"OrderCreated","anonymous":false,"inputs":[{"name":"id","type":"bytes32","indexed":true},{"name":"owner","type":"address","indexed":true}]}
]"#;

pub fn erc20_balance_call(token: Address, owner: Address) -> ContractCall {
    ContractCall::new(token, ERC20_ABI, "balanceOf").arg(owner.to_checksum(None))
}

pub fn erc20_decimals_call(token: Address) -> ContractCall {
    ContractCall::new(token, ERC20_ABI, "decimals")
}

pub fn erc20_allowance_call(token: Address, owner: Address, spender: Address) -> ContractCall {
    ContractCall::new(token, ERC20_ABI, "allowance")
        .arg(owner.to_checksum(None))
        .arg(spender.to_checksum(None))
}

pub fn erc20_approve_call(token: Address, spender: Address, amount: U256) -> ContractCall {
    ContractCall::new(token, ERC20_ABI, "approve")
        .arg(spender.to_checksum(None))
        .arg(amount.to_string())
}

pub fn erc20_transfer_call(token: Address, to: Address, amount: U256) -> ContractCall {
    ContractCall::new(token, ERC20_ABI, "transfer")
        .arg(to.to_checksum(None))
        .arg(amount.to_string())
}

/// A status flag keyed by a `bytes32` id, e.g. `isSwapped(bytes32)`.
pub fn flag_call(contract: Address, abi: &'static str, method: &str, id: B256) -> ContractCall {
    ContractCall::new(contract, abi, method).arg(id.to_string())
}

/// Reads and encodes contract calls for one chain.
#[derive(Clone)]
pub struct ContractClient {
    chain: ChainName,
    rpc: Arc<dyn ChainRpcPort>,
    abi: Arc<dyn AbiPort>,
}

impl ContractClient {
    pub fn new(chain: ChainName, rpc: Arc<dyn ChainRpcPort>, abi: Arc<dyn AbiPort>) -> Self {
        Self { chain, rpc, abi }
    }

    pub fn chain(&self) -> ChainName {
        self.chain
    }

    pub fn encode(&self, call: &ContractCall) -> Result<Bytes, Error> {
        self.abi
            .encode_call(call)
            .map_err(|e| Error::provider(format!("encoding {}", call.method), e))
    }

    pub async fn read(&self, call: &ContractCall) -> Result<Vec<Value>, Error> {
        let data = self.encode(call)?;
        let output = self
            .rpc
            .call(call.address, data)
            .await
            .map_err(|e| Error::network(format!("calling {} on {}", call.method, self.chain), e))?;
        self.abi
            .decode_output(call, &output)
            .map_err(|e| Error::provider(format!("decoding {}", call.method), e))
    }

    async fn read_first(&self, call: &ContractCall) -> Result<Value, Error> {
        self.read(call)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} returned nothing", call.method)))
    }

    pub async fn read_u256(&self, call: &ContractCall) -> Result<U256, Error> {
        let value = self.read_first(call).await?;
        value
            .as_str()
            .and_then(|raw| raw.parse::<U256>().ok())
            .ok_or_else(|| Error::NotFound(format!("{} returned {value}", call.method)))
    }

    pub async fn read_bool(&self, call: &ContractCall) -> Result<bool, Error> {
        let value = self.read_first(call).await?;
        value
            .as_bool()
            .ok_or_else(|| Error::NotFound(format!("{} returned {value}", call.method)))
    }

    pub async fn read_array_len(&self, call: &ContractCall) -> Result<usize, Error> {
        let value = self.read_first(call).await?;
        value
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| Error::NotFound(format!("{} returned {value}", call.method)))
    }

    pub async fn native_balance(&self, owner: Address) -> Result<U256, Error> {
        self.rpc
            .native_balance(owner)
            .await
            .map_err(|e| Error::network(format!("reading balance on {}", self.chain), e))
    }

    pub async fn gas_price(&self) -> Result<U256, Error> {
        self.rpc
            .gas_price()
            .await
            .map_err(|e| Error::network(format!("reading gas price on {}", self.chain), e))
    }

    pub async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, Error> {
        self.rpc
            .transaction_receipt(hash)
            .await
            .map_err(|e| Error::network(format!("fetching receipt {hash}"), e))
    }
}

/// One long-lived RPC client per chain, shared by every operation.
#[derive(Clone)]
pub struct ChainClients {
    abi: Arc<dyn AbiPort>,
    rpcs: BTreeMap<ChainName, Arc<dyn ChainRpcPort>>,
}

impl ChainClients {
    pub fn new(abi: Arc<dyn AbiPort>) -> Self {
        Self {
            abi,
            rpcs: BTreeMap::new(),
        }
    }

    pub fn with_chain(mut self, chain: ChainName, rpc: Arc<dyn ChainRpcPort>) -> Self {
        self.rpcs.insert(chain, rpc);
        self
    }

    pub fn client(&self, chain: ChainName) -> Result<ContractClient, Error> {
        let rpc = self
            .rpcs
            .get(&chain)
            .ok_or_else(|| Error::UnknownChain(format!("no rpc client for {chain}")))?;
        Ok(ContractClient::new(chain, Arc::clone(rpc), Arc::clone(&self.abi)))
    }

    pub fn chains(&self) -> impl Iterator<Item = ChainName> + '_ {
        self.rpcs.keys().copied()
    }
}
