#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;

use rusty_bridge_adapters::{
    AbiAdapter, BridgeRuntime, DefaultWalletFactory, Deployments, DeterministicWallet,
    ManualClock, MemorySessionStore, RuntimeParts,
};
use rusty_bridge_core::bridge::{default_routes, BridgeTransaction};
use rusty_bridge_core::contracts::ChainClients;
use rusty_bridge_core::domain::{
    BridgeHistoryEntry, LogEntry, OrderRecord, RelayNetworkToken, RelaySwap, RelaySwapRequest, RelaySwapStatus,
    RelayToken,
};
use rusty_bridge_core::{
    BridgeHistoryPort, BridgeToken, ChainName, ChainRegistry, ChainRpcPort, CheckpointPort,
    OrderBookApiPort,
    PollSettings, PortError, RelayServicePort, TokenCatalogPort, TokenRepresentation, TxReceipt,
    WalletKind,
};

pub const NOW_MS: u64 = 1_739_750_400_000;

pub fn addr(raw: &str) -> Address {
    raw.parse().expect("valid address")
}

pub fn user() -> Address {
    addr("0x1000000000000000000000000000000000000001")
}

pub fn other_user() -> Address {
    addr("0x2000000000000000000000000000000000000002")
}

pub fn usdt_eth() -> Address {
    addr("0xdAC17F958D2ee523a2206206994597C13D831ec7")
}

pub fn usdt_polygon() -> Address {
    addr("0xc2132D05D31c914a87C6611C10748AEb04B58e8F")
}

pub fn usdt_bsc() -> Address {
    addr("0x55d398326f99059fF775485246999027B3197955")
}

pub fn lock_mint_eth() -> Address {
    addr("0x00000000000000000000000000000000000000E1")
}

pub fn lock_mint_polygon() -> Address {
    addr("0x00000000000000000000000000000000000000A1")
}

pub fn lock_mint_goerli() -> Address {
    addr("0x00000000000000000000000000000000000000E5")
}

pub fn lock_mint_mumbai() -> Address {
    addr("0x00000000000000000000000000000000000000A5")
}

pub fn order_book_eth() -> Address {
    addr("0x00000000000000000000000000000000000000B1")
}

pub fn relay_deposit() -> Address {
    addr("0x00000000000000000000000000000000000000D1")
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn word(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}

pub fn units(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}

#[derive(Default)]
struct FakeRpcState {
    native: U256,
    gas_price: U256,
    answers: HashMap<(Address, [u8; 4]), Vec<u8>>,
    receipt_errors: u32,
    receipt_logs: Vec<LogEntry>,
    calls: Vec<(Address, [u8; 4])>,
    receipts: Vec<B256>,
}

/// Node double answering `eth_call` by (contract, selector); every receipt is
/// a success unless errors are queued.
#[derive(Default)]
pub struct FakeChainRpc {
    state: Mutex<FakeRpcState>,
}

impl FakeChainRpc {
    pub fn answer(&self, to: Address, signature: &str, output: Vec<u8>) {
        self.state
            .lock()
            .expect("rpc lock")
            .answers
            .insert((to, selector(signature)), output);
    }

    pub fn answer_u256(&self, to: Address, signature: &str, value: U256) {
        self.answer(to, signature, word(value));
    }

    pub fn answer_bool(&self, to: Address, signature: &str, value: bool) {
        self.answer_u256(to, signature, U256::from(value as u8));
    }

    pub fn answer_address_array(&self, to: Address, signature: &str, items: &[Address]) {
        let mut out = word(U256::from(32u64));
        out.extend(word(U256::from(items.len())));
        for item in items {
            let mut padded = vec![0u8; 12];
            padded.extend_from_slice(item.as_slice());
            out.extend(padded);
        }
        self.answer(to, signature, out);
    }

    pub fn set_native(&self, value: U256) {
        self.state.lock().expect("rpc lock").native = value;
    }

    pub fn set_gas_price(&self, wei: U256) {
        self.state.lock().expect("rpc lock").gas_price = wei;
    }

    pub fn fail_receipts(&self, count: u32) {
        self.state.lock().expect("rpc lock").receipt_errors = count;
    }

    pub fn set_receipt_logs(&self, logs: Vec<LogEntry>) {
        self.state.lock().expect("rpc lock").receipt_logs = logs;
    }

    pub fn calls_to(&self, to: Address, signature: &str) -> usize {
        let wanted = (to, selector(signature));
        self.state
            .lock()
            .expect("rpc lock")
            .calls
            .iter()
            .filter(|c| **c == wanted)
            .count()
    }

    pub fn receipts_requested(&self) -> Vec<B256> {
        self.state.lock().expect("rpc lock").receipts.clone()
    }
}

#[async_trait]
impl ChainRpcPort for FakeChainRpc {
    async fn native_balance(&self, _owner: Address) -> Result<U256, PortError> {
        Ok(self.state.lock().expect("rpc lock").native)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, PortError> {
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&data[..4]);
        let mut g = self.state.lock().expect("rpc lock");
        g.calls.push((to, sel));
        g.answers
            .get(&(to, sel))
            .cloned()
            .map(Bytes::from)
            .ok_or_else(|| PortError::Rpc {
                code: -32000,
                message: "execution reverted".to_owned(),
            })
    }

    async fn gas_price(&self) -> Result<U256, PortError> {
        Ok(self.state.lock().expect("rpc lock").gas_price)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, PortError> {
        let mut g = self.state.lock().expect("rpc lock");
        g.receipts.push(hash);
        if g.receipt_errors > 0 {
            g.receipt_errors -= 1;
            return Err(PortError::Transport("node unavailable".to_owned()));
        }
        Ok(Some(TxReceipt {
            transaction_hash: hash,
            status: true,
            block_number: Some(1),
            logs: g.receipt_logs.clone(),
        }))
    }
}

#[derive(Default)]
struct FakeRelayState {
    tokens: Vec<RelayToken>,
    fee: String,
    swaps: Vec<RelaySwapRequest>,
    statuses: Vec<RelaySwapStatus>,
}

/// Relay service double; statuses are served in order, the last one repeats.
#[derive(Default)]
pub struct FakeRelay {
    state: Mutex<FakeRelayState>,
}

impl FakeRelay {
    pub fn new(tokens: Vec<RelayToken>, fee: &str) -> Self {
        Self {
            state: Mutex::new(FakeRelayState {
                tokens,
                fee: fee.to_owned(),
                statuses: vec![RelaySwapStatus::Completed {
                    destination_tx: Some("0xdest".to_owned()),
                }],
                ..FakeRelayState::default()
            }),
        }
    }

    pub fn set_statuses(&self, statuses: Vec<RelaySwapStatus>) {
        self.state.lock().expect("relay lock").statuses = statuses;
    }

    pub fn swaps(&self) -> Vec<RelaySwapRequest> {
        self.state.lock().expect("relay lock").swaps.clone()
    }
}

#[async_trait]
impl RelayServicePort for FakeRelay {
    async fn tokens(&self) -> Result<Vec<RelayToken>, PortError> {
        Ok(self.state.lock().expect("relay lock").tokens.clone())
    }

    async fn network_fee(&self, _symbol: &str, _network: ChainName) -> Result<String, PortError> {
        Ok(self.state.lock().expect("relay lock").fee.clone())
    }

    async fn create_swap(&self, request: &RelaySwapRequest) -> Result<RelaySwap, PortError> {
        let mut g = self.state.lock().expect("relay lock");
        g.swaps.push(request.clone());
        Ok(RelaySwap {
            id: format!("swap-{}", g.swaps.len()),
            deposit_address: relay_deposit().to_checksum(None),
        })
    }

    async fn swap_status(&self, _swap_id: &str) -> Result<RelaySwapStatus, PortError> {
        let mut g = self.state.lock().expect("relay lock");
        if g.statuses.len() > 1 {
            return Ok(g.statuses.remove(0));
        }
        g.statuses
            .first()
            .cloned()
            .ok_or_else(|| PortError::NotFound("no status".to_owned()))
    }
}

/// Checkpoint service double; inclusion answers are served in order, the last
/// one repeats.
pub struct FakeCheckpoints {
    included: Mutex<Vec<bool>>,
    blocks: Mutex<Vec<(ChainName, u64)>>,
    payloads: Mutex<Vec<(ChainName, B256)>>,
}

impl Default for FakeCheckpoints {
    fn default() -> Self {
        Self {
            included: Mutex::new(vec![true]),
            blocks: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCheckpoints {
    pub fn exit_proof() -> Bytes {
        Bytes::from(vec![0xf9, 0x01, 0x02, 0x03])
    }

    pub fn set_included(&self, answers: Vec<bool>) {
        *self.included.lock().expect("checkpoint lock") = answers;
    }

    pub fn blocks_checked(&self) -> Vec<(ChainName, u64)> {
        self.blocks.lock().expect("checkpoint lock").clone()
    }

    pub fn payloads_requested(&self) -> Vec<(ChainName, B256)> {
        self.payloads.lock().expect("checkpoint lock").clone()
    }
}

#[async_trait]
impl CheckpointPort for FakeCheckpoints {
    async fn is_checkpointed(&self, network: ChainName, block: u64) -> Result<bool, PortError> {
        self.blocks
            .lock()
            .expect("checkpoint lock")
            .push((network, block));
        let mut included = self.included.lock().expect("checkpoint lock");
        if included.len() > 1 {
            return Ok(included.remove(0));
        }
        Ok(included.first().copied().unwrap_or(false))
    }

    async fn exit_payload(&self, network: ChainName, burn_tx: B256) -> Result<Bytes, PortError> {
        self.payloads
            .lock()
            .expect("checkpoint lock")
            .push((network, burn_tx));
        Ok(Self::exit_proof())
    }
}

/// Backend double: token catalog, history sink and trade records.
#[derive(Default)]
pub struct FakeBackend {
    tokens: Mutex<Vec<BridgeToken>>,
    history: Mutex<Vec<BridgeTransaction>>,
    listed: Mutex<Vec<BridgeHistoryEntry>>,
    catalog_requests: Mutex<Vec<(ChainName, ChainName)>>,
    trades: Mutex<BTreeMap<String, OrderRecord>>,
    reject_trades: Mutex<bool>,
}

impl FakeBackend {
    pub fn with_tokens(tokens: Vec<BridgeToken>) -> Self {
        Self {
            tokens: Mutex::new(tokens),
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<BridgeTransaction> {
        self.history.lock().expect("history lock").clone()
    }

    pub fn set_listed(&self, entries: Vec<BridgeHistoryEntry>) {
        *self.listed.lock().expect("listed lock") = entries;
    }

    pub fn catalog_requests(&self) -> Vec<(ChainName, ChainName)> {
        self.catalog_requests.lock().expect("catalog lock").clone()
    }

    pub fn trades(&self) -> BTreeMap<String, OrderRecord> {
        self.trades.lock().expect("trades lock").clone()
    }

    pub fn insert_trade(&self, link: &str, record: OrderRecord) {
        self.trades
            .lock()
            .expect("trades lock")
            .insert(link.to_owned(), record);
    }

    pub fn reject_trades(&self) {
        *self.reject_trades.lock().expect("reject lock") = true;
    }
}

#[async_trait]
impl TokenCatalogPort for FakeBackend {
    async fn bridge_tokens(
        &self,
        from: ChainName,
        to: ChainName,
    ) -> Result<Vec<BridgeToken>, PortError> {
        self.catalog_requests
            .lock()
            .expect("catalog lock")
            .push((from, to));
        Ok(self.tokens.lock().expect("tokens lock").clone())
    }
}

#[async_trait]
impl BridgeHistoryPort for FakeBackend {
    async fn record(&self, transaction: &BridgeTransaction) -> Result<(), PortError> {
        self.history
            .lock()
            .expect("history lock")
            .push(transaction.clone());
        Ok(())
    }

    async fn transactions(&self, _user: Address) -> Result<Vec<BridgeHistoryEntry>, PortError> {
        Ok(self.listed.lock().expect("listed lock").clone())
    }
}

#[async_trait]
impl OrderBookApiPort for FakeBackend {
    async fn create_trade(&self, record: &OrderRecord) -> Result<(), PortError> {
        if *self.reject_trades.lock().expect("reject lock") {
            return Err(PortError::Transport("backend down".to_owned()));
        }
        let mut trades = self.trades.lock().expect("trades lock");
        let link = format!("link-{}", trades.len() + 1);
        trades.insert(link, record.clone());
        Ok(())
    }

    async fn trade(&self, unique_link: &str) -> Result<OrderRecord, PortError> {
        self.trades
            .lock()
            .expect("trades lock")
            .get(unique_link)
            .cloned()
            .ok_or_else(|| PortError::NotFound(unique_link.to_owned()))
    }
}

pub fn representation(address: Address, decimals: u8) -> TokenRepresentation {
    TokenRepresentation {
        address: address.to_checksum(None),
        symbol: "USDT".to_owned(),
        name: "Tether USD".to_owned(),
        decimals,
        min_amount: None,
        max_amount: None,
    }
}

pub fn usdt_bridge_token() -> BridgeToken {
    BridgeToken {
        symbol: "USDT".to_owned(),
        name: "Tether USD".to_owned(),
        image: String::new(),
        rank: 1,
        representations: BTreeMap::from([
            (ChainName::Ethereum, representation(usdt_eth(), 6)),
            (ChainName::Polygon, representation(usdt_polygon(), 6)),
        ]),
    }
}

pub fn usdt_relay_token() -> RelayToken {
    let network = |network, address: Address| RelayNetworkToken {
        network,
        contract_address: address.to_checksum(None),
        decimals: 6,
        min_amount: Some("10".to_owned()),
        max_amount: Some("10000".to_owned()),
    };
    RelayToken {
        symbol: "USDT".to_owned(),
        name: "Tether USD".to_owned(),
        image: String::new(),
        networks: vec![
            network(ChainName::Ethereum, usdt_eth()),
            network(ChainName::BinanceSmartChain, usdt_bsc()),
        ],
    }
}

pub fn fast_poll() -> PollSettings {
    PollSettings {
        receipt_interval: Duration::from_millis(1),
        status_interval: Duration::from_millis(1),
        max_poll_errors: 1,
        token_refresh_interval: Duration::from_millis(20),
    }
}

pub struct Harness {
    pub runtime: BridgeRuntime,
    pub wallet: DeterministicWallet,
    pub store: Arc<MemorySessionStore>,
    pub eth: Arc<FakeChainRpc>,
    pub bsc: Arc<FakeChainRpc>,
    pub polygon: Arc<FakeChainRpc>,
    pub goerli: Arc<FakeChainRpc>,
    pub mumbai: Arc<FakeChainRpc>,
    pub relay: Arc<FakeRelay>,
    pub backend: Arc<FakeBackend>,
    pub checkpoints: Arc<FakeCheckpoints>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with_wallet(DeterministicWallet::new(vec![user()], 1))
}

pub fn harness_with_wallet(wallet: DeterministicWallet) -> Harness {
    build_harness(wallet, false)
}

/// Testing-mode runtime; the wallet starts on Goerli.
pub fn testnet_harness() -> Harness {
    build_harness(DeterministicWallet::new(vec![user()], 5), true)
}

fn build_harness(wallet: DeterministicWallet, testing_mode: bool) -> Harness {
    let store = Arc::new(MemorySessionStore::default());
    let factory = DefaultWalletFactory::new(store.clone(), Default::default())
        .with_handle(WalletKind::BrowserExtension, Arc::new(wallet.clone()))
        .with_handle(WalletKind::RelayWallet, Arc::new(wallet.clone()))
        .with_handle(WalletKind::QrRelay, Arc::new(wallet.clone()));

    let eth = Arc::new(FakeChainRpc::default());
    let bsc = Arc::new(FakeChainRpc::default());
    let polygon = Arc::new(FakeChainRpc::default());
    let goerli = Arc::new(FakeChainRpc::default());
    let mumbai = Arc::new(FakeChainRpc::default());
    let clients = ChainClients::new(Arc::new(AbiAdapter))
        .with_chain(ChainName::Ethereum, eth.clone())
        .with_chain(ChainName::BinanceSmartChain, bsc.clone())
        .with_chain(ChainName::Polygon, polygon.clone())
        .with_chain(ChainName::GoerliTestnet, goerli.clone())
        .with_chain(ChainName::PolygonTestnet, mumbai.clone());

    let relay = Arc::new(FakeRelay::new(vec![usdt_relay_token()], "1.5"));
    let backend = Arc::new(FakeBackend::with_tokens(vec![usdt_bridge_token()]));
    let checkpoints = Arc::new(FakeCheckpoints::default());
    let clock = Arc::new(ManualClock::new(NOW_MS));

    let deployments = Deployments {
        lock_mint_contracts: BTreeMap::from([
            (ChainName::Ethereum, lock_mint_eth()),
            (ChainName::Polygon, lock_mint_polygon()),
            (ChainName::GoerliTestnet, lock_mint_goerli()),
            (ChainName::PolygonTestnet, lock_mint_mumbai()),
        ]),
        lock_mint_blockchain_ids: BTreeMap::from([
            (ChainName::Ethereum, 1),
            (ChainName::Polygon, 2),
            (ChainName::GoerliTestnet, 5),
            (ChainName::PolygonTestnet, 80_001),
        ]),
        lock_mint_fees: BTreeMap::from([(ChainName::Polygon, "0.5".to_owned())]),
        order_book_contracts: BTreeMap::from([(ChainName::Ethereum, order_book_eth())]),
    };

    let runtime = BridgeRuntime::assemble(RuntimeParts {
        chains: Arc::new(ChainRegistry::default()),
        store: store.clone(),
        factory: Arc::new(factory),
        clients,
        clock: clock.clone(),
        relay: relay.clone(),
        catalog: backend.clone(),
        history: backend.clone(),
        checkpoints: checkpoints.clone(),
        order_api: backend.clone(),
        routes: default_routes(),
        deployments,
        poll: fast_poll(),
        testing_mode,
    })
    .expect("assemble runtime");

    Harness {
        runtime,
        wallet,
        store,
        eth,
        bsc,
        polygon,
        goerli,
        mumbai,
        relay,
        backend,
        checkpoints,
        clock,
    }
}

impl Harness {
    pub async fn connect_extension(&self) {
        self.runtime
            .connector
            .connect(WalletKind::BrowserExtension, None)
            .await
            .expect("connect");
        self.runtime
            .connector
            .activate(None)
            .await
            .expect("activate");
    }
}
