//! Bridge providers, their shared transaction lifecycle, and the route registry.

pub mod history;
pub mod lock_mint;
pub mod registry;
pub mod relay;
pub mod status;
pub mod transaction;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::ChainName;
use crate::connector::{ProviderConnector, ReadyWallet};
use crate::contracts::{erc20_balance_call, ChainClients, ContractClient};
use crate::domain::{
    BridgeToken, ContractCall, Fee, TokenAmount, TokenRepresentation, TxReceipt, TxRequest,
};
use crate::error::Error;
use crate::ports::{BridgeHistoryPort, CheckpointPort, ClockPort, PortError};
use crate::wallet::WalletProvider;

pub use history::BridgeHistory;
pub use registry::{default_routes, BridgeRegistry, BridgeRoute, PairLookup};
pub use status::{await_settlement, ContractSwapStatus, SettlementStatus, StatusSource};
pub use transaction::{tx_transition, BridgeTransaction, StateTransition, TxAction, TxState};

/// Called after every state transition of a bridge transaction.
pub type ProgressSink = Arc<dyn Fn(&BridgeTransaction) + Send + Sync>;

pub fn no_progress() -> ProgressSink {
    Arc::new(|_| {})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeProviderKind {
    RelayNetwork,
    LockMint,
}

impl fmt::Display for BridgeProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeProviderKind::RelayNetwork => f.write_str("relay-network"),
            BridgeProviderKind::LockMint => f.write_str("lock-mint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub from: ChainName,
    pub to: ChainName,
    pub token: BridgeToken,
    /// Human-readable amount in source-chain units, e.g. `"100"`.
    pub amount: String,
    pub destination_address: String,
}

#[async_trait]
pub trait BridgeProvider: Send + Sync {
    fn kind(&self) -> BridgeProviderKind;
    fn supports(&self, from: ChainName, to: ChainName) -> bool;

    /// Live token list: fetches on subscribe, then refreshes periodically.
    fn tokens(&self) -> BoxStream<'static, Result<Vec<BridgeToken>, Error>>;

    async fn quote_fee(&self, token: &BridgeToken, destination: ChainName) -> Result<Fee, Error>;

    async fn create_transaction(
        &self,
        request: BridgeRequest,
        progress: ProgressSink,
    ) -> Result<BridgeTransaction, Error>;

    /// Continues a failed or interrupted transaction from the step it stopped at.
    async fn resume_transaction(
        &self,
        transaction: BridgeTransaction,
        progress: ProgressSink,
    ) -> Result<BridgeTransaction, Error>;
}

/// Ethereum gas price above which transfers are flagged as expensive.
pub const HIGH_GAS_PRICE_GWEI: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub receipt_interval: Duration,
    pub status_interval: Duration,
    /// Consecutive polling errors tolerated before the run fails.
    pub max_poll_errors: u32,
    pub token_refresh_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            receipt_interval: Duration::from_secs(3),
            status_interval: Duration::from_secs(10),
            max_poll_errors: 5,
            token_refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Collaborators every bridge provider runs against.
pub struct BridgeContext {
    pub connector: Arc<ProviderConnector>,
    pub clients: ChainClients,
    pub clock: Arc<dyn ClockPort>,
    pub history: Option<Arc<dyn BridgeHistoryPort>>,
    pub checkpoints: Option<Arc<dyn CheckpointPort>>,
    pub poll: PollSettings,
    sequence: AtomicU64,
}

impl BridgeContext {
    pub fn new(
        connector: Arc<ProviderConnector>,
        clients: ChainClients,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            connector,
            clients,
            clock,
            history: None,
            checkpoints: None,
            poll: PollSettings::default(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn BridgeHistoryPort>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointPort>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn checkpoints(&self) -> Result<&Arc<dyn CheckpointPort>, Error> {
        self.checkpoints
            .as_ref()
            .ok_or_else(|| Error::NotFound("checkpoint service".to_owned()))
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn now_ms(&self) -> Result<u64, Error> {
        self.clock
            .now_ms()
            .map_err(|e| Error::provider("reading clock", e))
    }

    pub fn next_id(&self, from: ChainName, to: ChainName) -> Result<String, Error> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{from}-{to}-{}-{seq}", self.now_ms()?))
    }

    /// Whether gas on `network` costs more than `HIGH_GAS_PRICE_GWEI`.
    pub async fn gas_price_is_high(&self, network: ChainName) -> Result<bool, Error> {
        let price = self.clients.client(network)?.gas_price().await?;
        let threshold = U256::from(HIGH_GAS_PRICE_GWEI) * U256::from(1_000_000_000u64);
        Ok(price > threshold)
    }

    /// Best-effort post to the history backend.
    pub async fn record_history(&self, tx: &BridgeTransaction) {
        let Some(history) = &self.history else {
            return;
        };
        if let Err(e) = history.record(tx).await {
            warn!(id = %tx.id, error = %e, "failed to record bridge transaction history");
        }
    }
}

/// Per-run state: the wallet snapshot taken at start and the progress sink.
pub(crate) struct RunContext {
    pub wallet: Option<Arc<dyn WalletProvider>>,
    pub progress: ProgressSink,
}

impl RunContext {
    pub fn wallet(&self) -> Result<&Arc<dyn WalletProvider>, Error> {
        self.wallet.as_ref().ok_or(Error::WalletNotConnected)
    }

    pub fn advance(
        &self,
        tx: &mut BridgeTransaction,
        action: TxAction,
        reason: &str,
    ) -> Result<(), Error> {
        let to = tx.apply(action, reason)?;
        debug!(id = %tx.id, state = ?to, reason, "bridge transaction advanced");
        (self.progress)(tx);
        Ok(())
    }
}

/// One topology's step function: performs the work for `tx.state` and
/// advances it by at least one transition.
#[async_trait]
pub(crate) trait BridgeSteps: Send + Sync + 'static {
    async fn step(&self, tx: &mut BridgeTransaction, run: &RunContext) -> Result<(), Error>;
}

/// Drives `tx` until it is terminal or waits on the user, on a spawned task,
/// so dropping the returned future does not stop the run.
pub(crate) async fn drive<S: BridgeSteps>(
    steps: Arc<S>,
    mut tx: BridgeTransaction,
    run: RunContext,
) -> Result<BridgeTransaction, Error> {
    let handle = tokio::spawn(async move {
        while !tx.state.ends_run() {
            if let Err(cause) = steps.step(&mut tx, &run).await {
                match tx.fail(&cause) {
                    Ok(_) => (run.progress)(&tx),
                    Err(e) => warn!(id = %tx.id, error = %e, "could not mark transaction failed"),
                }
                warn!(
                    id = %tx.id,
                    failed_at = ?tx.failed_at,
                    error = %cause,
                    "bridge transaction failed"
                );
                return Err(Error::TransactionFailed {
                    transaction: Box::new(tx),
                    cause: Box::new(cause),
                });
            }
        }
        Ok(tx)
    });
    handle.await.map_err(|e| Error::Task(e.to_string()))?
}

/// Rebuilds a run for a stored transaction. A failed transaction goes back to
/// the step it failed in, one awaiting a claim starts claiming, and a terminal
/// one is returned as is by `drive`.
pub(crate) fn resume_run(
    connector: &ProviderConnector,
    supported: bool,
    transaction: BridgeTransaction,
    progress: ProgressSink,
) -> Result<(BridgeTransaction, RunContext), Error> {
    if !supported {
        return Err(Error::BridgePairUnsupported {
            from: transaction.source_chain,
            to: transaction.destination_chain,
            suggested: None,
        });
    }
    let mut tx = transaction.clone();
    if tx.state == TxState::Failed {
        tx.retry()?;
    }
    let wallet = match resume_wallet(connector, &tx) {
        Ok(wallet) => wallet,
        Err(cause) => {
            return Err(Error::TransactionFailed {
                transaction: Box::new(transaction),
                cause: Box::new(cause),
            })
        }
    };
    let run = RunContext { wallet, progress };
    if tx.state != transaction.state {
        (run.progress)(&tx);
    }
    if tx.state == TxState::AwaitingClaim {
        run.advance(&mut tx, TxAction::Claim, "claim requested")?;
    }
    Ok((tx, run))
}

/// Wallet for a resumed run. Steps before submission sign on the source
/// network, a claim signs on the destination network; the rest need none.
fn resume_wallet(
    connector: &ProviderConnector,
    tx: &BridgeTransaction,
) -> Result<Option<Arc<dyn WalletProvider>>, Error> {
    match tx.state {
        TxState::Created | TxState::BalanceChecked | TxState::Approved => {
            let ready = on_network(connector, tx.source_chain, tx.source_network)?;
            if ready.address != tx.source_address {
                return Err(Error::AccountMissing);
            }
            Ok(Some(ready.provider))
        }
        TxState::AwaitingClaim | TxState::Claiming => {
            let ready = on_network(connector, tx.destination_chain, tx.destination_network)?;
            Ok(Some(ready.provider))
        }
        _ => Ok(connector.provider()),
    }
}

/// A ready wallet on exactly `network`, the network a transaction was started on.
fn on_network(
    connector: &ProviderConnector,
    chain: ChainName,
    network: ChainName,
) -> Result<ReadyWallet, Error> {
    let ready = connector.ready_wallet(chain)?;
    if ready.chain != network {
        return Err(Error::WrongNetwork {
            required: network,
            active: Some(ready.chain),
        });
    }
    Ok(ready)
}

/// Fails with `InsufficientFunds` when `owner` holds less than `amount`.
pub async fn ensure_balance(
    client: &ContractClient,
    representation: &TokenRepresentation,
    owner: Address,
    amount: TokenAmount,
) -> Result<(), Error> {
    let available = if representation.is_native() {
        client.native_balance(owner).await?
    } else {
        client
            .read_u256(&erc20_balance_call(representation.evm_address()?, owner))
            .await?
    };
    if available < amount.raw {
        return Err(Error::InsufficientFunds {
            symbol: representation.symbol.clone(),
            available: TokenAmount::new(available, amount.decimals).to_string(),
            requested: amount.to_string(),
        });
    }
    Ok(())
}

pub(crate) async fn submit_call(
    wallet: &Arc<dyn WalletProvider>,
    client: &ContractClient,
    from: Address,
    call: &ContractCall,
) -> Result<B256, Error> {
    let data = client.encode(call)?;
    wallet
        .send_transaction(&TxRequest {
            from,
            to: call.address,
            value: call.value,
            data,
        })
        .await
}

pub(crate) async fn send_native(
    wallet: &Arc<dyn WalletProvider>,
    from: Address,
    to: Address,
    value: U256,
) -> Result<B256, Error> {
    wallet
        .send_transaction(&TxRequest {
            from,
            to,
            value,
            data: Default::default(),
        })
        .await
}

/// Polls for a receipt with no overall timeout; a reverted receipt is an error.
pub async fn wait_for_receipt(
    client: &ContractClient,
    hash: B256,
    poll: &PollSettings,
) -> Result<TxReceipt, Error> {
    let mut errors = 0u32;
    loop {
        match client.receipt(hash).await {
            Ok(Some(receipt)) if receipt.status => return Ok(receipt),
            Ok(Some(_)) => return Err(Error::TransactionReverted(hash)),
            Ok(None) => errors = 0,
            Err(e) => {
                errors += 1;
                if errors > poll.max_poll_errors {
                    return Err(e);
                }
                debug!(%hash, errors, error = %e, "receipt poll failed");
            }
        }
        tokio::time::sleep(poll.receipt_interval).await;
    }
}

/// Token list stream that fetches immediately and then every `interval`.
pub fn refreshing_tokens<F, Fut>(
    interval: Duration,
    fetch: F,
) -> BoxStream<'static, Result<Vec<BridgeToken>, Error>>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<BridgeToken>, Error>> + Send + 'static,
{
    stream::unfold((fetch, true), move |(fetch, first)| async move {
        if !first {
            tokio::time::sleep(interval).await;
        }
        let tokens = fetch().await;
        Some((tokens, (fetch, false)))
    })
    .boxed()
}

/// Common preamble of `create_transaction`: pair, readiness, amount, balance.
/// Everything here fails raw, before anything is submitted.
pub(crate) async fn prepare_transaction(
    ctx: &BridgeContext,
    supported: bool,
    request: &BridgeRequest,
    progress: ProgressSink,
) -> Result<(BridgeTransaction, RunContext), Error> {
    if !supported {
        return Err(Error::BridgePairUnsupported {
            from: request.from,
            to: request.to,
            suggested: None,
        });
    }
    let ready = ctx.connector.ready_wallet(request.from)?;
    let address = ready.address;
    let source_network = ready.chain;
    let destination_network = if source_network == request.from {
        request.to
    } else {
        request.to.test_network()
    };
    let representation = request.token.representation(request.from)?;
    request.token.representation(request.to)?;
    let amount = representation.checked_amount(&request.amount)?;
    let client = ctx.clients.client(source_network)?;

    let mut tx = BridgeTransaction::new(
        ctx.next_id(request.from, request.to)?,
        request.from,
        request.to,
        request.token.symbol.clone(),
        amount,
        address,
        request.destination_address.clone(),
    )
    .with_networks(source_network, destination_network);
    tx.token_address = representation.address.clone();
    let run = RunContext {
        wallet: Some(ready.provider),
        progress,
    };
    (run.progress)(&tx);
    if request.from == ChainName::Ethereum {
        match ctx.gas_price_is_high(source_network).await {
            Ok(true) => warn!(id = %tx.id, network = %source_network, "gas price is high"),
            Ok(false) => {}
            Err(e) => debug!(id = %tx.id, error = %e, "gas price unavailable"),
        }
    }
    ensure_balance(&client, representation, address, amount).await?;
    run.advance(&mut tx, TxAction::CheckBalance, "balance sufficient")?;
    Ok((tx, run))
}

/// Moves an `AwaitingRelay` transaction to the state `status` describes;
/// `Completed` confirms it.
pub(crate) fn apply_settlement(
    tx: &mut BridgeTransaction,
    run: &RunContext,
    status: SettlementStatus,
) -> Result<(), Error> {
    match status {
        SettlementStatus::Pending => Ok(()),
        SettlementStatus::Completed { destination_tx } => {
            tx.destination_tx_hash = destination_tx;
            run.advance(tx, TxAction::Confirm, "destination confirmed")
        }
        SettlementStatus::Cancelled => run.advance(tx, TxAction::Cancel, "cancelled by relay"),
        SettlementStatus::Expired => run.advance(tx, TxAction::Expire, "deadline passed"),
        SettlementStatus::Failed(reason) => Err(Error::provider(
            "settling transfer",
            PortError::Policy(reason),
        )),
    }
}
