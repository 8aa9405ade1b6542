pub mod bridge;
pub mod chain;
pub mod connector;
pub mod contracts;
pub mod domain;
pub mod error;
pub mod notify;
pub mod order_book;
pub mod ports;
pub mod wallet;

pub use bridge::{
    BridgeContext, BridgeProvider, BridgeProviderKind, BridgeRegistry, BridgeRequest, BridgeRoute,
    BridgeTransaction, PairLookup, PollSettings, ProgressSink, TxAction, TxState,
};
pub use chain::{Chain, ChainName, ChainRegistry};
pub use connector::{ProviderConnector, ReadyWallet, WalletFactory, PROVIDER_STORAGE_KEY};
pub use domain::{
    BridgeHistoryEntry, BridgeToken, ContractCall, Fee, TimestampMs, TokenAmount,
    TokenRepresentation, TxReceipt, TxRequest, WalletKind, WalletSession, WatchAsset,
};
pub use error::{ActivationFailure, Error};
pub use notify::{ReplayChannel, Subscription};
pub use order_book::{OrderBookService, OrderRef, OrderStatus, OrderTrade};
pub use ports::{
    AbiPort, BridgeHistoryPort, ChainRpcPort, CheckpointPort, ClockPort, OrderBookApiPort,
    PortError, RelayServicePort, SessionStorePort, TokenCatalogPort, WalletEvent,
    WalletEventSink, WalletHandle,
};
pub use wallet::{SessionCell, WalletChannels, WalletProvider, WalletTimeouts};
