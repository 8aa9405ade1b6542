//! Relay-network bridge: the user deposits to an address assigned by the relay
//! service and the backend pays out on the destination chain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::info;

use super::{
    apply_settlement, await_settlement, drive, prepare_transaction, refreshing_tokens,
    resume_run, send_native, submit_call, wait_for_receipt, BridgeContext, BridgeProvider,
    BridgeProviderKind, BridgeRequest, BridgeSteps, BridgeTransaction, ProgressSink, RunContext,
    SettlementStatus, StatusSource, TxAction, TxState,
};
use crate::chain::ChainName;
use crate::contracts::erc20_transfer_call;
use crate::domain::{
    BridgeToken, Fee, RelaySwapRequest, RelaySwapStatus, RelayToken, TokenAmount,
    TokenRepresentation,
};
use crate::error::Error;
use crate::ports::{PortError, RelayServicePort};

#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub pairs: Vec<(ChainName, ChainName)>,
    /// Restricts the listed tokens, e.g. to `USDT` on Tron routes.
    pub allowed_symbols: Option<Vec<String>>,
}

/// Swap status as reported by the relay service's REST endpoint.
pub struct RelaySwapSource {
    service: Arc<dyn RelayServicePort>,
    swap_id: String,
}

impl RelaySwapSource {
    pub fn new(service: Arc<dyn RelayServicePort>, swap_id: String) -> Self {
        Self { service, swap_id }
    }
}

#[async_trait]
impl StatusSource for RelaySwapSource {
    async fn poll(&self) -> Result<SettlementStatus, Error> {
        let status = self
            .service
            .swap_status(&self.swap_id)
            .await
            .map_err(|e| Error::network(format!("polling swap {}", self.swap_id), e))?;
        Ok(match status {
            RelaySwapStatus::Pending => SettlementStatus::Pending,
            RelaySwapStatus::Completed { destination_tx } => {
                SettlementStatus::Completed { destination_tx }
            }
            RelaySwapStatus::Cancelled => SettlementStatus::Cancelled,
            RelaySwapStatus::Failed(reason) => SettlementStatus::Failed(reason),
        })
    }
}

struct RelaySteps {
    ctx: Arc<BridgeContext>,
    service: Arc<dyn RelayServicePort>,
    config: RelayConfig,
}

pub struct RelayBridge {
    steps: Arc<RelaySteps>,
}

impl RelayBridge {
    pub fn new(
        ctx: Arc<BridgeContext>,
        service: Arc<dyn RelayServicePort>,
        config: RelayConfig,
    ) -> Self {
        Self {
            steps: Arc::new(RelaySteps {
                ctx,
                service,
                config,
            }),
        }
    }
}

impl RelaySteps {
    async fn open_swap(
        &self,
        tx: &mut BridgeTransaction,
        run: &RunContext,
    ) -> Result<Address, Error> {
        if tx.deposit_address.is_none() {
            let swap = self
                .service
                .create_swap(&RelaySwapRequest {
                    symbol: tx.token.clone(),
                    from_network: tx.source_chain,
                    to_network: tx.destination_chain,
                    amount: tx.amount.to_string(),
                    destination_address: tx.destination_address.clone(),
                    refund_address: tx.source_address.to_checksum(None),
                })
                .await
                .map_err(|e| Error::network("creating relay swap", e))?;
            info!(id = %tx.id, swap = %swap.id, "relay swap created");
            tx.memo = Some(swap.id);
            tx.deposit_address = Some(swap.deposit_address);
            (run.progress)(tx);
        }
        let deposit = tx.deposit_address.as_deref().unwrap_or_default();
        deposit.parse().map_err(|_| {
            Error::provider(
                "reading deposit address",
                PortError::Validation(format!("invalid deposit address {deposit}")),
            )
        })
    }

    async fn deposit(&self, tx: &mut BridgeTransaction, run: &RunContext) -> Result<(), Error> {
        let deposit = self.open_swap(tx, run).await?;
        let wallet = run.wallet()?;
        let token: Address = tx
            .token_address
            .parse()
            .map_err(|_| Error::NotFound(format!("EVM address for {}", tx.token)))?;
        let hash = if token == Address::ZERO {
            send_native(wallet, tx.source_address, deposit, tx.amount.raw).await?
        } else {
            let client = self.ctx.clients.client(tx.source_network)?;
            let call = erc20_transfer_call(token, deposit, tx.amount.raw);
            submit_call(wallet, &client, tx.source_address, &call).await?
        };
        tx.source_tx_hash = Some(hash);
        info!(id = %tx.id, %hash, "relay deposit submitted");
        run.advance(tx, TxAction::Submit, "deposited to relay")
    }

    fn source_hash(tx: &BridgeTransaction) -> Result<B256, Error> {
        tx.source_tx_hash
            .ok_or_else(|| Error::NotFound(format!("source transaction hash of {}", tx.id)))
    }

    fn swap_id(tx: &BridgeTransaction) -> Result<String, Error> {
        tx.memo
            .clone()
            .ok_or_else(|| Error::NotFound(format!("relay swap id of {}", tx.id)))
    }
}

#[async_trait]
impl BridgeSteps for RelaySteps {
    async fn step(&self, tx: &mut BridgeTransaction, run: &RunContext) -> Result<(), Error> {
        match tx.state {
            TxState::BalanceChecked => self.deposit(tx, run).await,
            TxState::SourceSubmitted => {
                let client = self.ctx.clients.client(tx.source_network)?;
                wait_for_receipt(&client, Self::source_hash(tx)?, &self.ctx.poll).await?;
                self.ctx.record_history(tx).await;
                run.advance(tx, TxAction::AwaitRelay, "deposit confirmed")
            }
            TxState::AwaitingRelay => {
                let source = RelaySwapSource::new(Arc::clone(&self.service), Self::swap_id(tx)?);
                let settled = await_settlement(
                    &source,
                    self.ctx.poll.status_interval,
                    tx.deadline,
                    self.ctx.clock.as_ref(),
                    self.ctx.poll.max_poll_errors,
                )
                .await?;
                apply_settlement(tx, run, settled)
            }
            from => Err(Error::IllegalTransition {
                from,
                action: TxAction::Submit,
            }),
        }
    }
}

fn is_allowed(config: &RelayConfig, symbol: &str) -> bool {
    match &config.allowed_symbols {
        Some(allowed) => allowed.iter().any(|s| s.eq_ignore_ascii_case(symbol)),
        None => true,
    }
}

fn to_bridge_token(token: RelayToken, chains: &BTreeSet<ChainName>) -> BridgeToken {
    let representations: BTreeMap<ChainName, TokenRepresentation> = token
        .networks
        .into_iter()
        .filter(|n| chains.contains(&n.network))
        .map(|n| {
            (
                n.network,
                TokenRepresentation {
                    address: n.contract_address,
                    symbol: token.symbol.clone(),
                    name: token.name.clone(),
                    decimals: n.decimals,
                    min_amount: n.min_amount,
                    max_amount: n.max_amount,
                },
            )
        })
        .collect();
    BridgeToken {
        symbol: token.symbol,
        name: token.name,
        image: token.image,
        rank: 0,
        representations,
    }
}

#[async_trait]
impl BridgeProvider for RelayBridge {
    fn kind(&self) -> BridgeProviderKind {
        BridgeProviderKind::RelayNetwork
    }

    fn supports(&self, from: ChainName, to: ChainName) -> bool {
        self.steps.config.pairs.contains(&(from, to))
    }

    fn tokens(&self) -> BoxStream<'static, Result<Vec<BridgeToken>, Error>> {
        let service = Arc::clone(&self.steps.service);
        let config = self.steps.config.clone();
        refreshing_tokens(self.steps.ctx.poll.token_refresh_interval, move || {
            let service = Arc::clone(&service);
            let config = config.clone();
            async move {
                let chains: BTreeSet<ChainName> = config
                    .pairs
                    .iter()
                    .flat_map(|(from, to)| [*from, *to])
                    .collect();
                let tokens = service
                    .tokens()
                    .await
                    .map_err(|e| Error::network("loading relay tokens", e))?;
                Ok(tokens
                    .into_iter()
                    .filter(|t| is_allowed(&config, &t.symbol))
                    .map(|t| to_bridge_token(t, &chains))
                    .filter(|t| t.representations.len() >= 2)
                    .collect())
            }
        })
    }

    async fn quote_fee(&self, token: &BridgeToken, destination: ChainName) -> Result<Fee, Error> {
        let representation = token.representation(destination)?;
        let raw = self
            .steps
            .service
            .network_fee(&token.symbol, destination)
            .await
            .map_err(|e| Error::network(format!("quoting {} fee", token.symbol), e))?;
        Ok(Fee {
            amount: TokenAmount::parse(&raw, representation.decimals)?,
            symbol: token.symbol.clone(),
        })
    }

    async fn create_transaction(
        &self,
        request: BridgeRequest,
        progress: ProgressSink,
    ) -> Result<BridgeTransaction, Error> {
        let supported = self.supports(request.from, request.to);
        let (tx, run) = prepare_transaction(&self.steps.ctx, supported, &request, progress).await?;
        drive(Arc::clone(&self.steps), tx, run).await
    }

    async fn resume_transaction(
        &self,
        transaction: BridgeTransaction,
        progress: ProgressSink,
    ) -> Result<BridgeTransaction, Error> {
        let supported = self.supports(transaction.source_chain, transaction.destination_chain);
        let (tx, run) = resume_run(&self.steps.ctx.connector, supported, transaction, progress)?;
        drive(Arc::clone(&self.steps), tx, run).await
    }
}
