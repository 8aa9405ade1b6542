use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{Chain, ChainName};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    #[serde(rename = "METAMASK")]
    BrowserExtension,
    #[serde(rename = "WALLET_LINK")]
    RelayWallet,
    #[serde(rename = "WALLET_CONNECT")]
    QrRelay,
}

impl WalletKind {
    pub const ALL: [WalletKind; 3] = [
        WalletKind::BrowserExtension,
        WalletKind::RelayWallet,
        WalletKind::QrRelay,
    ];

    /// Persisted form, also the value stored under the session key.
    pub fn as_str(self) -> &'static str {
        match self {
            WalletKind::BrowserExtension => "METAMASK",
            WalletKind::RelayWallet => "WALLET_LINK",
            WalletKind::QrRelay => "WALLET_CONNECT",
        }
    }

    /// Only the injected extension accepts `wallet_switchEthereumChain`.
    pub fn can_switch_network(self) -> bool {
        matches!(self, WalletKind::BrowserExtension)
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        WalletKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| Error::NotFound(format!("wallet kind {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSession {
    pub provider_kind: WalletKind,
    pub address: Option<Address>,
    pub chain: Option<Chain>,
    pub is_enabled: bool,
}

/// Integer token amount paired with its decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn parse(amount: &str, decimals: u8) -> Result<Self, Error> {
        let trimmed = amount.trim();
        if trimmed.is_empty() || trimmed.starts_with('-') {
            return Err(Error::InvalidAmount(amount.to_owned()));
        }
        let parsed = parse_units(trimmed, decimals)
            .map_err(|e| Error::InvalidAmount(format!("{amount}: {e}")))?;
        Ok(Self::new(parsed.get_absolute(), decimals))
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = format_units(self.raw, self.decimals).map_err(|_| fmt::Error)?;
        if formatted.contains('.') {
            f.write_str(formatted.trim_end_matches('0').trim_end_matches('.'))
        } else {
            f.write_str(&formatted)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: TokenAmount,
    pub symbol: String,
}

impl fmt::Display for Fee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRepresentation {
    /// Checksummed hex on EVM chains, base58 on Tron. The zero address is the native coin.
    pub address: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub min_amount: Option<String>,
    #[serde(default)]
    pub max_amount: Option<String>,
}

impl TokenRepresentation {
    pub fn evm_address(&self) -> Result<Address, Error> {
        self.address
            .parse()
            .map_err(|_| Error::NotFound(format!("EVM address for {}", self.symbol)))
    }

    pub fn is_native(&self) -> bool {
        self.evm_address().map(|a| a == Address::ZERO).unwrap_or(false)
    }

    pub fn amount(&self, amount: &str) -> Result<TokenAmount, Error> {
        TokenAmount::parse(amount, self.decimals)
    }

    /// Parses `amount` and checks it against the representation's limits.
    pub fn checked_amount(&self, amount: &str) -> Result<TokenAmount, Error> {
        let parsed = self.amount(amount)?;
        if parsed.is_zero() {
            return Err(Error::InvalidAmount(format!("{amount} must be positive")));
        }
        let min = self
            .min_amount
            .as_deref()
            .map(|m| self.amount(m))
            .transpose()?;
        let max = self
            .max_amount
            .as_deref()
            .map(|m| self.amount(m))
            .transpose()?;
        let below = min.is_some_and(|min| parsed < min);
        let above = max.is_some_and(|max| parsed > max);
        if below || above {
            return Err(Error::AmountOutOfRange {
                symbol: self.symbol.clone(),
                amount: parsed.to_string(),
                min: min.map(|m| m.to_string()).unwrap_or_else(|| "0".to_owned()),
                max: max.map(|m| m.to_string()).unwrap_or_else(|| "unbounded".to_owned()),
            });
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeToken {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rank: u32,
    pub representations: BTreeMap<ChainName, TokenRepresentation>,
}

impl BridgeToken {
    pub fn representation(&self, chain: ChainName) -> Result<&TokenRepresentation, Error> {
        self.representations
            .get(&chain)
            .ok_or_else(|| Error::NotFound(format!("{} on {chain}", self.symbol)))
    }
}

/// Picks a token by symbol out of a catalog list.
pub fn find_token<'a>(tokens: &'a [BridgeToken], symbol: &str) -> Result<&'a BridgeToken, Error> {
    tokens
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| Error::NotFound(format!("token {symbol}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchAsset {
    pub chain: ChainName,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub status: bool,
    pub block_number: Option<u64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// A contract method invocation by address, ABI and method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub address: Address,
    pub abi: &'static str,
    pub method: String,
    pub args: Vec<Value>,
    pub value: U256,
}

impl ContractCall {
    pub fn new(address: Address, abi: &'static str, method: &str) -> Self {
        Self {
            address,
            abi,
            method: method.to_owned(),
            args: Vec::new(),
            value: U256::ZERO,
        }
    }

    pub fn arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayNetworkToken {
    pub network: ChainName,
    pub contract_address: String,
    pub decimals: u8,
    #[serde(default)]
    pub min_amount: Option<String>,
    #[serde(default)]
    pub max_amount: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayToken {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub networks: Vec<RelayNetworkToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySwapRequest {
    pub symbol: String,
    pub from_network: ChainName,
    pub to_network: ChainName,
    pub amount: String,
    pub destination_address: String,
    pub refund_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySwap {
    pub id: String,
    pub deposit_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelaySwapStatus {
    Pending,
    Completed { destination_tx: Option<String> },
    Cancelled,
    Failed(String),
}

/// Order-book trade record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub memo_contract: String,
    pub contract_address: String,
    pub base_address: String,
    pub quote_address: String,
    pub base_limit: String,
    pub quote_limit: String,
    /// Milliseconds since the epoch.
    pub stop_date: u64,
    #[serde(rename = "public")]
    pub is_public: bool,
    pub min_base_wei: String,
    pub min_quote_wei: String,
    pub broker_fee: bool,
    pub broker_fee_address: String,
    pub broker_fee_base: u32,
    pub broker_fee_quote: u32,
    pub name: String,
    pub network: u32,
    pub state: String,
    #[serde(default)]
    pub unique_link: Option<String>,
}

/// A past bridge transfer as the backend lists it for a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHistoryEntry {
    #[serde(alias = "fromBlockchain")]
    pub from_network: ChainName,
    #[serde(alias = "toBlockchain")]
    pub to_network: ChainName,
    /// Token symbol; transfers touching Polygon carry the token address here.
    pub from_symbol: String,
    pub to_symbol: String,
    #[serde(default)]
    pub amount: String,
    pub status: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub wallet_to_address: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}
