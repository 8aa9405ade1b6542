//! REST client for the Panama relay network (Binance Bridge API v2 shape).
//!
//! Every response is wrapped as `{"code": 20000, "message": ..., "data": ...}`;
//! any other code is a service-side refusal.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use rusty_bridge_core::domain::{
    RelayNetworkToken, RelaySwap, RelaySwapRequest, RelaySwapStatus, RelayToken,
};
use rusty_bridge_core::{ChainName, PortError, RelayServicePort};

use crate::rest::{decimal_string, RestClient};

const SUCCESS_CODE: i64 = 20000;

/// Tether's TRC-20 contract; the relay lists USDT by its Ethereum contract only.
pub const TRON_USDT_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// Referral source id sent with swap creation.
const SWAP_SOURCE: u32 = 921;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanamaToken {
    symbol: String,
    name: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    eth_contract_address: Option<String>,
    #[serde(default)]
    eth_contract_decimal: Option<u8>,
    #[serde(default)]
    bsc_contract_address: Option<String>,
    #[serde(default)]
    bsc_contract_decimal: Option<u8>,
    #[serde(default)]
    min_amount: Value,
    #[serde(default)]
    max_amount: Value,
}

#[derive(Debug, Deserialize)]
struct TokenList {
    tokens: Vec<PanamaToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanamaNetwork {
    name: String,
    network_fee: Value,
}

#[derive(Debug, Deserialize)]
struct NetworkList {
    networks: Vec<PanamaNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanamaSwap {
    id: String,
    #[serde(default)]
    deposit_address: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    swap_tx_id: Option<String>,
}

/// Relay-side network code of a chain.
pub fn panama_network(chain: ChainName) -> Result<&'static str, PortError> {
    match chain {
        ChainName::Ethereum => Ok("ETH"),
        ChainName::BinanceSmartChain => Ok("BSC"),
        ChainName::Tron => Ok("TRX"),
        ChainName::Polygon => Ok("MATIC"),
        other => Err(PortError::Validation(format!(
            "{other} is not served by the relay network"
        ))),
    }
}

impl PanamaToken {
    fn into_relay_token(self) -> RelayToken {
        let min_amount = decimal_string(&self.min_amount);
        let max_amount = decimal_string(&self.max_amount);
        let network = |chain: ChainName, address: Option<String>, decimals: Option<u8>| {
            Some(RelayNetworkToken {
                network: chain,
                contract_address: address.filter(|a| !a.is_empty())?,
                decimals: decimals?,
                min_amount: min_amount.clone(),
                max_amount: max_amount.clone(),
            })
        };
        let mut networks: Vec<RelayNetworkToken> = [
            network(
                ChainName::Ethereum,
                self.eth_contract_address.clone(),
                self.eth_contract_decimal,
            ),
            network(
                ChainName::BinanceSmartChain,
                self.bsc_contract_address,
                self.bsc_contract_decimal,
            ),
        ]
        .into_iter()
        .flatten()
        .collect();
        if self.symbol == "USDT" {
            if let Some(tron) = network(
                ChainName::Tron,
                Some(TRON_USDT_ADDRESS.to_owned()),
                self.eth_contract_decimal,
            ) {
                networks.push(tron);
            }
        }
        RelayToken {
            symbol: self.symbol,
            name: self.name,
            image: self.icon,
            networks,
        }
    }
}

fn swap_status(swap: PanamaSwap) -> RelaySwapStatus {
    match swap.status.as_str() {
        "Completed" => RelaySwapStatus::Completed {
            destination_tx: swap.swap_tx_id.filter(|id| !id.is_empty()),
        },
        "Cancelled" | "Expired" => RelaySwapStatus::Cancelled,
        "DepositFailed" | "WithdrawFailed" | "Failed" => RelaySwapStatus::Failed(swap.status),
        _ => RelaySwapStatus::Pending,
    }
}

#[derive(Debug, Clone)]
pub struct PanamaRelayService {
    rest: RestClient,
}

impl PanamaRelayService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }

    fn unwrap<T>(what: &str, envelope: Envelope<T>) -> Result<T, PortError> {
        if envelope.code != SUCCESS_CODE {
            return Err(PortError::Policy(format!(
                "{what}: relay code {}: {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }
        envelope
            .data
            .ok_or_else(|| PortError::Validation(format!("{what}: relay response without data")))
    }

    async fn get<T: DeserializeOwned>(&self, what: &str, path: &str) -> Result<T, PortError> {
        let envelope: Envelope<T> = self.rest.get(path, &[]).await?;
        Self::unwrap(what, envelope)
    }
}

#[async_trait]
impl RelayServicePort for PanamaRelayService {
    async fn tokens(&self) -> Result<Vec<RelayToken>, PortError> {
        let list: TokenList = self.get("tokens", "tokens").await?;
        debug!(count = list.tokens.len(), "relay tokens loaded");
        Ok(list
            .tokens
            .into_iter()
            .map(PanamaToken::into_relay_token)
            .collect())
    }

    async fn network_fee(&self, symbol: &str, network: ChainName) -> Result<String, PortError> {
        let code = panama_network(network)?;
        let list: NetworkList = self
            .get("network fee", &format!("tokens/{symbol}/networks"))
            .await?;
        list.networks
            .into_iter()
            .find(|n| n.name.eq_ignore_ascii_case(code))
            .and_then(|n| decimal_string(&n.network_fee))
            .ok_or_else(|| PortError::NotFound(format!("{symbol} fee on {code}")))
    }

    async fn create_swap(&self, request: &RelaySwapRequest) -> Result<RelaySwap, PortError> {
        let body = json!({
            "amount": request.amount,
            "fromNetwork": panama_network(request.from_network)?,
            "toNetwork": panama_network(request.to_network)?,
            "source": SWAP_SOURCE,
            "symbol": request.symbol,
            "toAddress": request.destination_address,
            "toAddressLabel": "",
            "walletAddress": request.refund_address,
            "walletNetwork": panama_network(request.from_network)?,
        });
        let envelope: Envelope<PanamaSwap> = self.rest.post("swaps", &body).await?;
        let swap = Self::unwrap("create swap", envelope)?;
        if swap.deposit_address.is_empty() {
            return Err(PortError::Validation(format!(
                "swap {} has no deposit address",
                swap.id
            )));
        }
        Ok(RelaySwap {
            id: swap.id,
            deposit_address: swap.deposit_address,
        })
    }

    async fn swap_status(&self, swap_id: &str) -> Result<RelaySwapStatus, PortError> {
        let swap: PanamaSwap = self.get("swap status", &format!("swaps/{swap_id}")).await?;
        Ok(swap_status(swap))
    }
}
