pub mod abi;
pub mod bridge_api;
pub mod checkpoint;
pub mod clock;
pub mod config;
mod connection;
pub mod eip1193;
pub mod factory;
pub mod handle;
pub mod relay_service;
pub mod rest;
pub mod rpc;
pub mod runtime;
pub mod storage;
pub mod wallet_link;
pub mod wc;

pub use abi::AbiAdapter;
pub use bridge_api::BackendApi;
pub use checkpoint::ProofGeneratorApi;
pub use clock::{ManualClock, SystemClockAdapter};
pub use config::AdapterConfig;
pub use eip1193::BrowserExtensionProvider;
pub use factory::DefaultWalletFactory;
pub use handle::{DeterministicWallet, HttpWalletHandle};
pub use relay_service::PanamaRelayService;
pub use rpc::{connect_all, JsonRpcClient};
pub use runtime::{BridgeRuntime, Deployments, RuntimeParts};
pub use storage::{FileSessionStore, MemorySessionStore};
pub use wallet_link::RelayWalletProvider;
pub use wc::QrRelayProvider;
