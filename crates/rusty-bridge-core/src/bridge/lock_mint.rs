//! Lock/mint bridge: tokens are locked in a source contract and minted on the
//! destination once the relayer observes the lock. Burns on a checkpointed
//! sidechain are instead claimed by the user once their block is checkpointed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use alloy::primitives::{hex, Address, B256, U256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::info;

use super::{
    apply_settlement, await_settlement, drive, prepare_transaction, refreshing_tokens,
    resume_run, submit_call, wait_for_receipt, BridgeContext, BridgeProvider, BridgeProviderKind,
    BridgeRequest, BridgeSteps, BridgeTransaction, ContractSwapStatus, ProgressSink, RunContext,
    SettlementStatus, StatusSource, TxAction, TxState,
};
use crate::chain::ChainName;
use crate::contracts::{erc20_allowance_call, erc20_approve_call, LOCK_MINT_ABI};
use crate::domain::{BridgeToken, ContractCall, Fee, TokenAmount};
use crate::error::Error;
use crate::ports::{CheckpointPort, TokenCatalogPort};

#[derive(Debug, Clone, Default)]
pub struct LockMintConfig {
    pub pairs: Vec<(ChainName, ChainName)>,
    /// Bridge contract on each chain.
    pub contracts: BTreeMap<ChainName, Address>,
    /// Destination id the contracts expect in `transferToOtherBlockchain`.
    pub blockchain_ids: BTreeMap<ChainName, u64>,
    /// Flat protocol fee per destination, in its native coin.
    pub fees: BTreeMap<ChainName, String>,
    /// Pairs whose burn is claimed with `exit` after a checkpoint instead of
    /// being relayed.
    pub checkpoint_routes: Vec<(ChainName, ChainName)>,
}

impl LockMintConfig {
    pub fn contract(&self, chain: ChainName) -> Result<Address, Error> {
        self.contracts
            .get(&chain)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("lock/mint contract on {chain}")))
    }

    pub fn blockchain_id(&self, chain: ChainName) -> Result<u64, Error> {
        self.blockchain_ids
            .get(&chain)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("lock/mint blockchain id for {chain}")))
    }

    pub fn settles_by_checkpoint(&self, from: ChainName, to: ChainName) -> bool {
        self.checkpoint_routes.contains(&(from, to))
    }

    /// Same contracts and fees, restricted to one pair.
    pub fn for_pair(&self, from: ChainName, to: ChainName) -> Self {
        Self {
            pairs: vec![(from, to)],
            ..self.clone()
        }
    }
}

/// Polls the checkpoint service until the burn block is committed.
pub struct CheckpointStatus {
    checkpoints: Arc<dyn CheckpointPort>,
    network: ChainName,
    block: u64,
}

impl CheckpointStatus {
    pub fn new(checkpoints: Arc<dyn CheckpointPort>, network: ChainName, block: u64) -> Self {
        Self {
            checkpoints,
            network,
            block,
        }
    }
}

#[async_trait]
impl StatusSource for CheckpointStatus {
    async fn poll(&self) -> Result<SettlementStatus, Error> {
        let included = self
            .checkpoints
            .is_checkpointed(self.network, self.block)
            .await
            .map_err(|e| {
                Error::network(format!("checking checkpoint of block {}", self.block), e)
            })?;
        Ok(if included {
            SettlementStatus::Completed {
                destination_tx: None,
            }
        } else {
            SettlementStatus::Pending
        })
    }
}

struct LockMintSteps {
    ctx: Arc<BridgeContext>,
    catalog: Arc<dyn TokenCatalogPort>,
    config: LockMintConfig,
}

pub struct LockMintBridge {
    steps: Arc<LockMintSteps>,
}

impl LockMintBridge {
    pub fn new(
        ctx: Arc<BridgeContext>,
        catalog: Arc<dyn TokenCatalogPort>,
        config: LockMintConfig,
    ) -> Self {
        Self {
            steps: Arc::new(LockMintSteps {
                ctx,
                catalog,
                config,
            }),
        }
    }
}

impl LockMintSteps {
    fn token_address(tx: &BridgeTransaction) -> Result<Address, Error> {
        tx.token_address
            .parse()
            .map_err(|_| Error::NotFound(format!("EVM address for {}", tx.token)))
    }

    async fn needs_approval(&self, tx: &BridgeTransaction, token: Address) -> Result<bool, Error> {
        if token == Address::ZERO {
            return Ok(false);
        }
        let spender = self.config.contract(tx.source_network)?;
        let client = self.ctx.clients.client(tx.source_network)?;
        let allowance = client
            .read_u256(&erc20_allowance_call(token, tx.source_address, spender))
            .await?;
        Ok(allowance < tx.amount.raw)
    }

    async fn approve(
        &self,
        tx: &mut BridgeTransaction,
        run: &RunContext,
        token: Address,
    ) -> Result<(), Error> {
        let spender = self.config.contract(tx.source_network)?;
        let client = self.ctx.clients.client(tx.source_network)?;
        let call = erc20_approve_call(token, spender, tx.amount.raw);
        let hash = submit_call(run.wallet()?, &client, tx.source_address, &call).await?;
        info!(id = %tx.id, %hash, "approval submitted");
        wait_for_receipt(&client, hash, &self.ctx.poll).await?;
        run.advance(tx, TxAction::Approve, "allowance approved")
    }

    async fn submit(
        &self,
        tx: &mut BridgeTransaction,
        run: &RunContext,
        token: Address,
    ) -> Result<(), Error> {
        let contract = self.config.contract(tx.source_network)?;
        let client = self.ctx.clients.client(tx.source_network)?;
        let value = if token == Address::ZERO {
            tx.amount.raw
        } else {
            U256::ZERO
        };
        let call = ContractCall::new(contract, LOCK_MINT_ABI, "transferToOtherBlockchain")
            .arg(self.config.blockchain_id(tx.destination_network)?.to_string())
            .arg(tx.amount.raw.to_string())
            .arg(tx.destination_address.clone())
            .with_value(value);
        let hash = submit_call(run.wallet()?, &client, tx.source_address, &call).await?;
        tx.source_tx_hash = Some(hash);
        info!(id = %tx.id, %hash, "lock transaction submitted");
        run.advance(tx, TxAction::Submit, "locked on source chain")
    }

    async fn await_checkpoint(
        &self,
        tx: &mut BridgeTransaction,
        run: &RunContext,
    ) -> Result<(), Error> {
        let block = tx
            .source_block
            .ok_or_else(|| Error::NotFound(format!("source block of {}", tx.id)))?;
        let status = CheckpointStatus::new(
            Arc::clone(self.ctx.checkpoints()?),
            tx.source_network,
            block,
        );
        let settled = await_settlement(
            &status,
            self.ctx.poll.status_interval,
            tx.deadline,
            self.ctx.clock.as_ref(),
            self.ctx.poll.max_poll_errors,
        )
        .await?;
        match settled {
            SettlementStatus::Completed { .. } => {
                info!(id = %tx.id, block, "burn checkpointed, ready to claim");
                run.advance(tx, TxAction::Checkpoint, "burn checkpointed")
            }
            other => apply_settlement(tx, run, other),
        }
    }

    /// Submits `exit` with the burn proof on the destination, once.
    async fn claim(&self, tx: &mut BridgeTransaction, run: &RunContext) -> Result<(), Error> {
        let client = self.ctx.clients.client(tx.destination_network)?;
        let hash = match tx.claim_tx_hash {
            Some(hash) => hash,
            None => {
                let payload = self
                    .ctx
                    .checkpoints()?
                    .exit_payload(tx.source_network, Self::source_hash(tx)?)
                    .await
                    .map_err(|e| Error::network("fetching exit proof", e))?;
                let call = ContractCall::new(
                    self.config.contract(tx.destination_network)?,
                    LOCK_MINT_ABI,
                    "exit",
                )
                .arg(hex::encode_prefixed(&payload));
                let wallet = run.wallet()?;
                let from = wallet
                    .session()
                    .snapshot()
                    .address
                    .ok_or(Error::AccountMissing)?;
                let hash = submit_call(wallet, &client, from, &call).await?;
                info!(id = %tx.id, %hash, "claim submitted");
                tx.claim_tx_hash = Some(hash);
                (run.progress)(tx);
                hash
            }
        };
        wait_for_receipt(&client, hash, &self.ctx.poll).await?;
        tx.destination_tx_hash = Some(hash.to_string());
        run.advance(tx, TxAction::Confirm, "claimed on destination")
    }

    fn source_hash(tx: &BridgeTransaction) -> Result<B256, Error> {
        tx.source_tx_hash
            .ok_or_else(|| Error::NotFound(format!("source transaction hash of {}", tx.id)))
    }
}

#[async_trait]
impl BridgeSteps for LockMintSteps {
    async fn step(&self, tx: &mut BridgeTransaction, run: &RunContext) -> Result<(), Error> {
        match tx.state {
            TxState::BalanceChecked => {
                let token = Self::token_address(tx)?;
                if self.needs_approval(tx, token).await? {
                    self.approve(tx, run, token).await
                } else {
                    self.submit(tx, run, token).await
                }
            }
            TxState::Approved => {
                let token = Self::token_address(tx)?;
                self.submit(tx, run, token).await
            }
            TxState::SourceSubmitted => {
                let client = self.ctx.clients.client(tx.source_network)?;
                let receipt =
                    wait_for_receipt(&client, Self::source_hash(tx)?, &self.ctx.poll).await?;
                tx.source_block = receipt.block_number;
                self.ctx.record_history(tx).await;
                run.advance(tx, TxAction::AwaitRelay, "source confirmed")
            }
            TxState::AwaitingRelay
                if self
                    .config
                    .settles_by_checkpoint(tx.source_chain, tx.destination_chain) =>
            {
                self.await_checkpoint(tx, run).await
            }
            TxState::AwaitingRelay => {
                let status = ContractSwapStatus::new(
                    self.ctx.clients.client(tx.destination_network)?,
                    self.config.contract(tx.destination_network)?,
                    LOCK_MINT_ABI,
                    Self::source_hash(tx)?,
                );
                let settled = await_settlement(
                    &status,
                    self.ctx.poll.status_interval,
                    tx.deadline,
                    self.ctx.clock.as_ref(),
                    self.ctx.poll.max_poll_errors,
                )
                .await?;
                apply_settlement(tx, run, settled)
            }
            TxState::Claiming => self.claim(tx, run).await,
            from => Err(Error::IllegalTransition {
                from,
                action: TxAction::Submit,
            }),
        }
    }
}

/// Merges per-pair catalogs into one list keyed by symbol.
fn merge_tokens(lists: Vec<Vec<BridgeToken>>, chains: &BTreeSet<ChainName>) -> Vec<BridgeToken> {
    let mut merged: BTreeMap<String, BridgeToken> = BTreeMap::new();
    for token in lists.into_iter().flatten() {
        let entry = merged
            .entry(token.symbol.clone())
            .or_insert_with(|| BridgeToken {
                representations: BTreeMap::new(),
                ..token.clone()
            });
        entry.representations.extend(
            token
                .representations
                .into_iter()
                .filter(|(chain, _)| chains.contains(chain)),
        );
    }
    let mut tokens: Vec<BridgeToken> = merged
        .into_values()
        .filter(|t| t.representations.len() >= 2)
        .collect();
    tokens.sort_by_key(|t| t.rank);
    tokens
}

#[async_trait]
impl BridgeProvider for LockMintBridge {
    fn kind(&self) -> BridgeProviderKind {
        BridgeProviderKind::LockMint
    }

    fn supports(&self, from: ChainName, to: ChainName) -> bool {
        self.steps.config.pairs.contains(&(from, to))
    }

    fn tokens(&self) -> BoxStream<'static, Result<Vec<BridgeToken>, Error>> {
        let catalog = Arc::clone(&self.steps.catalog);
        let pairs = self.steps.config.pairs.clone();
        refreshing_tokens(self.steps.ctx.poll.token_refresh_interval, move || {
            let catalog = Arc::clone(&catalog);
            let pairs = pairs.clone();
            async move {
                let chains: BTreeSet<ChainName> =
                    pairs.iter().flat_map(|(from, to)| [*from, *to]).collect();
                let mut lists = Vec::with_capacity(pairs.len());
                for (from, to) in pairs {
                    let tokens = catalog
                        .bridge_tokens(from, to)
                        .await
                        .map_err(|e| Error::network(format!("loading {from}->{to} tokens"), e))?;
                    lists.push(tokens);
                }
                Ok(merge_tokens(lists, &chains))
            }
        })
    }

    async fn quote_fee(&self, _token: &BridgeToken, destination: ChainName) -> Result<Fee, Error> {
        let chain = self.steps.ctx.connector.chains().by_name(destination)?;
        let native = &chain.native_coin;
        let raw = self
            .steps
            .config
            .fees
            .get(&destination)
            .map(String::as_str)
            .unwrap_or("0");
        Ok(Fee {
            amount: TokenAmount::parse(raw, native.decimals)?,
            symbol: native.symbol.clone(),
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
