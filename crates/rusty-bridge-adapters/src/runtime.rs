//! Wires ports, providers and services into one runnable bridge.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use alloy::primitives::Address;
use serde::Deserialize;
use tracing::info;

use rusty_bridge_core::bridge::lock_mint::{LockMintBridge, LockMintConfig};
use rusty_bridge_core::bridge::relay::{RelayBridge, RelayConfig};
use rusty_bridge_core::bridge::{default_routes, BridgeHistory, BridgeRoute};
use rusty_bridge_core::contracts::ChainClients;
use rusty_bridge_core::order_book::OrderBookConfig;
use rusty_bridge_core::{
    BridgeContext, BridgeHistoryPort, BridgeProvider, BridgeProviderKind, BridgeRegistry,
    ChainName, ChainRegistry, CheckpointPort, ClockPort, Error, OrderBookApiPort, OrderBookService, PollSettings,
    PortError, ProviderConnector, RelayServicePort, SessionStorePort, TokenCatalogPort,
    WalletFactory, WalletKind,
};

use crate::abi::AbiAdapter;
use crate::bridge_api::BackendApi;
use crate::checkpoint::ProofGeneratorApi;
use crate::clock::SystemClockAdapter;
use crate::config::AdapterConfig;
use crate::factory::DefaultWalletFactory;
use crate::handle::HttpWalletHandle;
use crate::relay_service::PanamaRelayService;
use crate::rpc::connect_all;
use crate::storage::{FileSessionStore, MemorySessionStore};

/// Only USDT has a Tron representation on the relay.
const TRON_SYMBOLS: [&str; 1] = ["USDT"];

/// Burns on these pairs are claimed on the destination after a checkpoint.
const CHECKPOINT_ROUTES: [(ChainName, ChainName); 1] =
    [(ChainName::Polygon, ChainName::Ethereum)];

/// Deployed contract addresses, loaded from a JSON file keyed by chain name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Deployments {
    pub lock_mint_contracts: BTreeMap<ChainName, Address>,
    pub lock_mint_blockchain_ids: BTreeMap<ChainName, u64>,
    pub lock_mint_fees: BTreeMap<ChainName, String>,
    pub order_book_contracts: BTreeMap<ChainName, Address>,
}

impl Deployments {
    pub fn load(path: &Path) -> Result<Self, PortError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PortError::Transport(format!("{}: read failed: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            PortError::Validation(format!("{}: invalid deployments: {e}", path.display()))
        })
    }

    /// The configured deployments file, or no contracts at all.
    pub fn from_config(config: &AdapterConfig) -> Result<Self, PortError> {
        match &config.deployments_path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn lock_mint(&self) -> LockMintConfig {
        LockMintConfig {
            pairs: Vec::new(),
            contracts: self.lock_mint_contracts.clone(),
            blockchain_ids: self.lock_mint_blockchain_ids.clone(),
            fees: self.lock_mint_fees.clone(),
            checkpoint_routes: CHECKPOINT_ROUTES.to_vec(),
        }
    }

    pub fn order_book(&self) -> OrderBookConfig {
        OrderBookConfig {
            contracts: self.order_book_contracts.clone(),
        }
    }
}

/// Every port the runtime runs against.
pub struct RuntimeParts {
    pub chains: Arc<ChainRegistry>,
    pub store: Arc<dyn SessionStorePort>,
    pub factory: Arc<dyn WalletFactory>,
    pub clients: ChainClients,
    pub clock: Arc<dyn ClockPort>,
    pub relay: Arc<dyn RelayServicePort>,
    pub catalog: Arc<dyn TokenCatalogPort>,
    pub history: Arc<dyn BridgeHistoryPort>,
    pub checkpoints: Arc<dyn CheckpointPort>,
    pub order_api: Arc<dyn OrderBookApiPort>,
    pub routes: Vec<BridgeRoute>,
    pub deployments: Deployments,
    pub poll: PollSettings,
    pub testing_mode: bool,
}

pub struct BridgeRuntime {
    pub connector: Arc<ProviderConnector>,
    pub context: Arc<BridgeContext>,
    pub registry: BridgeRegistry,
    pub history: BridgeHistory,
    pub order_book: OrderBookService,
}

impl BridgeRuntime {
    pub fn assemble(parts: RuntimeParts) -> Result<Self, Error> {
        let connector = Arc::new(ProviderConnector::new(
            parts.factory,
            parts.store,
            Arc::clone(&parts.chains),
        ));
        connector.set_testing_mode(parts.testing_mode);

        let context = Arc::new(
            BridgeContext::new(
                Arc::clone(&connector),
                parts.clients.clone(),
                Arc::clone(&parts.clock),
            )
            .with_history(Arc::clone(&parts.history))
            .with_checkpoints(parts.checkpoints)
            .with_poll_settings(parts.poll),
        );

        let history = BridgeHistory::new(Arc::clone(&parts.history), Arc::clone(&parts.catalog));
        let lock_mint = parts.deployments.lock_mint();
        let relay = parts.relay;
        let catalog = parts.catalog;
        let registry = BridgeRegistry::build(parts.routes, |route| {
            let provider: Arc<dyn BridgeProvider> = match route.kind {
                BridgeProviderKind::RelayNetwork => Arc::new(RelayBridge::new(
                    Arc::clone(&context),
                    Arc::clone(&relay),
                    relay_config(route),
                )),
                BridgeProviderKind::LockMint => Arc::new(LockMintBridge::new(
                    Arc::clone(&context),
                    Arc::clone(&catalog),
                    lock_mint.for_pair(route.from, route.to),
                )),
            };
            Ok(provider)
        })?;

        let order_book = OrderBookService::new(
            Arc::clone(&connector),
            parts.clients,
            parts.clock,
            parts.order_api,
            parts.deployments.order_book(),
        )
        .with_poll_settings(parts.poll);

        info!(
            routes = registry.routes().count(),
            testing_mode = parts.testing_mode,
            "bridge runtime assembled"
        );
        Ok(Self {
            connector,
            context,
            registry,
            history,
            order_book,
        })
    }

    /// Production wiring: HTTP services, JSON-RPC nodes, optional wallet proxy.
    pub fn from_config(config: &AdapterConfig, deployments: Deployments) -> Result<Self, Error> {
        let timeout = config.http_timeout();
        let chains = config
            .rpc_overrides
            .iter()
            .fold(ChainRegistry::default(), |chains, (name, url)| {
                chains.with_rpc_endpoint(*name, url.clone())
            });
        let chains = Arc::new(chains);

        let store: Arc<dyn SessionStorePort> = match &config.session_store_path {
            Some(path) => Arc::new(FileSessionStore::new(path.clone())),
            None => Arc::new(MemorySessionStore::default()),
        };

        let mut factory = DefaultWalletFactory::new(Arc::clone(&store), config.wallet_timeouts());
        if let Some(url) = &config.wallet_proxy_url {
            let handle = Arc::new(
                HttpWalletHandle::new(url.clone(), timeout)
                    .map_err(|e| Error::provider("building wallet proxy", e))?,
            );
            for kind in WalletKind::ALL {
                factory = factory.with_handle(kind, handle.clone());
            }
        }

        let clients = connect_all(&chains, Arc::new(AbiAdapter), timeout)
            .map_err(|e| Error::network("building rpc clients", e))?;
        let relay = PanamaRelayService::new(config.relay_service_base_url.clone(), timeout)
            .map_err(|e| Error::network("building relay client", e))?;
        let backend = Arc::new(
            BackendApi::new(config.backend_base_url.clone(), timeout)
                .map_err(|e| Error::network("building backend client", e))?,
        );
        let checkpoints = ProofGeneratorApi::new(config.checkpoint_base_url.clone(), timeout)
            .map_err(|e| Error::network("building checkpoint client", e))?;

        Self::assemble(RuntimeParts {
            chains,
            store,
            factory: Arc::new(factory),
            clients,
            clock: Arc::new(SystemClockAdapter),
            relay: Arc::new(relay),
            catalog: backend.clone(),
            history: backend.clone(),
            checkpoints: Arc::new(checkpoints),
            order_api: backend,
            routes: default_routes(),
            deployments,
            poll: config.poll_settings(),
            testing_mode: config.testing_mode,
        })
    }
}

pub fn relay_config(route: &BridgeRoute) -> RelayConfig {
    RelayConfig {
        pairs: vec![(route.from, route.to)],
        allowed_symbols: (route.to == ChainName::Tron)
            .then(|| TRON_SYMBOLS.iter().map(|s| (*s).to_owned()).collect()),
    }
}
