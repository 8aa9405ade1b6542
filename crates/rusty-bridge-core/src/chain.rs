//! Static chain metadata, loaded once and looked up by id or name.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainName {
    Ethereum,
    BinanceSmartChain,
    Polygon,
    Tron,
    Xdai,
    EthereumTestnet,
    GoerliTestnet,
    BinanceSmartChainTestnet,
    PolygonTestnet,
}

impl ChainName {
    pub const ALL: [ChainName; 9] = [
        ChainName::Ethereum,
        ChainName::BinanceSmartChain,
        ChainName::Polygon,
        ChainName::Tron,
        ChainName::Xdai,
        ChainName::EthereumTestnet,
        ChainName::GoerliTestnet,
        ChainName::BinanceSmartChainTestnet,
        ChainName::PolygonTestnet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChainName::Ethereum => "ETH",
            ChainName::BinanceSmartChain => "BSC",
            ChainName::Polygon => "POLYGON",
            ChainName::Tron => "TRON",
            ChainName::Xdai => "XDAI",
            ChainName::EthereumTestnet => "ETH_TESTNET",
            ChainName::GoerliTestnet => "GOERLI_TESTNET",
            ChainName::BinanceSmartChainTestnet => "BSC_TESTNET",
            ChainName::PolygonTestnet => "POLYGON_TESTNET",
        }
    }

    /// Chains accepted in place of `self` when testing mode is on.
    pub fn testnets(self) -> &'static [ChainName] {
        match self {
            ChainName::Ethereum => &[ChainName::EthereumTestnet, ChainName::GoerliTestnet],
            ChainName::BinanceSmartChain => &[ChainName::BinanceSmartChainTestnet],
            ChainName::Polygon => &[ChainName::PolygonTestnet],
            _ => &[],
        }
    }

    /// The network this chain runs on in testing mode.
    pub fn test_network(self) -> ChainName {
        self.testnets().last().copied().unwrap_or(self)
    }

    pub fn is_evm(self) -> bool {
        !matches!(self, ChainName::Tron)
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainName {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let upper = raw.trim().to_ascii_uppercase();
        ChainName::ALL
            .into_iter()
            .find(|name| name.as_str() == upper)
            .or(match upper.as_str() {
                "ETHEREUM" => Some(ChainName::Ethereum),
                "BINANCE_SMART_CHAIN" => Some(ChainName::BinanceSmartChain),
                "MATIC" => Some(ChainName::Polygon),
                "TRX" => Some(ChainName::Tron),
                _ => None,
            })
            .ok_or_else(|| Error::UnknownChain(format!("name {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCoin {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: u64,
    pub name: ChainName,
    pub rpc_endpoint: String,
    pub explorer_url: String,
    pub native_coin: NativeCoin,
}

impl Chain {
    pub fn hex_id(&self) -> String {
        format!("{:#x}", self.id)
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}tx/{}", self.explorer_url, tx_hash)
    }
}

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new(builtin_chains())
    }
}

impl ChainRegistry {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self { chains }
    }

    pub fn by_id(&self, id: u64) -> Result<&Chain, Error> {
        self.chains
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::UnknownChain(format!("id {id}")))
    }

    /// Accepts the `eth_chainId` forms wallets emit: `"0x38"`, `"56"`.
    pub fn by_hex_id(&self, raw: &str) -> Result<&Chain, Error> {
        let id = parse_chain_id(raw).ok_or_else(|| Error::UnknownChain(format!("id {raw}")))?;
        self.by_id(id)
    }

    pub fn by_name(&self, name: ChainName) -> Result<&Chain, Error> {
        self.chains
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownChain(format!("name {name}")))
    }

    pub fn with_rpc_endpoint(mut self, name: ChainName, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if let Some(chain) = self.chains.iter_mut().find(|c| c.name == name) {
            chain.rpc_endpoint = endpoint;
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }
}

pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn native(name: &str, symbol: &str, decimals: u8) -> NativeCoin {
    NativeCoin {
        address: Address::ZERO,
        name: name.to_owned(),
        symbol: symbol.to_owned(),
        decimals,
    }
}

fn builtin_chains() -> Vec<Chain> {
    vec![
        Chain {
            id: 1,
            name: ChainName::Ethereum,
            rpc_endpoint: "https://eth.llamarpc.com".to_owned(),
            explorer_url: "https://etherscan.io/".to_owned(),
            native_coin: native("Ethereum", "ETH", 18),
        },
        Chain {
            id: 56,
            name: ChainName::BinanceSmartChain,
            rpc_endpoint: "https://bsc-dataseed.binance.org".to_owned(),
            explorer_url: "https://bscscan.com/".to_owned(),
            native_coin: native("Binance Coin", "BNB", 18),
        },
        Chain {
            id: 137,
            name: ChainName::Polygon,
            rpc_endpoint: "https://polygon-rpc.com".to_owned(),
            explorer_url: "https://polygonscan.com/".to_owned(),
            native_coin: native("Polygon", "MATIC", 18),
        },
        Chain {
            id: 728_126_428,
            name: ChainName::Tron,
            rpc_endpoint: "https://api.trongrid.io/jsonrpc".to_owned(),
            explorer_url: "https://tronscan.org/#/".to_owned(),
            native_coin: native("Tron", "TRX", 6),
        },
        Chain {
            id: 100,
            name: ChainName::Xdai,
            rpc_endpoint: "https://rpc.gnosischain.com".to_owned(),
            explorer_url: "https://gnosisscan.io/".to_owned(),
            native_coin: native("xDai", "XDAI", 18),
        },
        Chain {
            id: 42,
            name: ChainName::EthereumTestnet,
            rpc_endpoint: "https://kovan.infura.io/v3".to_owned(),
            explorer_url: "https://kovan.etherscan.io/".to_owned(),
            native_coin: native("Ethereum", "ETH", 18),
        },
        Chain {
            id: 5,
            name: ChainName::GoerliTestnet,
            rpc_endpoint: "https://rpc.ankr.com/eth_goerli".to_owned(),
            explorer_url: "https://goerli.etherscan.io/".to_owned(),
            native_coin: native("Ethereum", "ETH", 18),
        },
        Chain {
            id: 97,
            name: ChainName::BinanceSmartChainTestnet,
            rpc_endpoint: "https://data-seed-prebsc-1-s1.binance.org:8545".to_owned(),
            explorer_url: "https://testnet.bscscan.com/".to_owned(),
            native_coin: native("Binance Coin", "BNB", 18),
        },
        Chain {
            id: 80_001,
            name: ChainName::PolygonTestnet,
            rpc_endpoint: "https://rpc-mumbai.maticvigil.com".to_owned(),
            explorer_url: "https://mumbai.polygonscan.com/".to_owned(),
            native_coin: native("Polygon", "MATIC", 18),
        },
    ]
}
