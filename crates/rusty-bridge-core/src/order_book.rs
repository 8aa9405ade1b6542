//! Peer-to-peer limit orders settled by an on-chain order contract.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bridge::{await_settlement, submit_call, wait_for_receipt};
use crate::bridge::{ContractSwapStatus, PollSettings, SettlementStatus, StatusSource};
use crate::chain::ChainName;
use crate::connector::ProviderConnector;
use crate::contracts::{erc20_decimals_call, ChainClients, ContractClient, ORDER_BOOK_ABI};
use crate::domain::{ContractCall, OrderRecord, TimestampMs, TokenAmount, TxReceipt};
use crate::error::Error;
use crate::ports::{ClockPort, OrderBookApiPort, PortError};

const ORDER_CREATED_EVENT: &str = "OrderCreated(bytes32,address)";

/// Backend network code for an order chain.
pub fn network_code(chain: ChainName) -> Result<u32, Error> {
    match chain {
        ChainName::Ethereum => Ok(1),
        ChainName::BinanceSmartChain => Ok(22),
        ChainName::Polygon => Ok(24),
        other => Err(Error::UnknownChain(format!("no order-book network code for {other}"))),
    }
}

pub fn chain_for_network_code(code: u32) -> Result<ChainName, Error> {
    match code {
        1 => Ok(ChainName::Ethereum),
        22 => Ok(ChainName::BinanceSmartChain),
        24 => Ok(ChainName::Polygon),
        other => Err(Error::UnknownChain(format!("order-book network code {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Active,
    Done,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTokenInput {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub amount: String,
    pub min_contribution: String,
    pub broker_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub chain: ChainName,
    pub base: OrderTokenInput,
    pub quote: OrderTokenInput,
    pub stop_date: TimestampMs,
    pub is_public: bool,
    pub broker_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSide {
    pub address: Address,
    pub decimals: u8,
    pub limit: TokenAmount,
    pub min_contribution: TokenAmount,
    pub broker_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTrade {
    pub memo: B256,
    pub chain: ChainName,
    pub contract: Address,
    pub base: OrderSide,
    pub quote: OrderSide,
    pub stop_date: TimestampMs,
    pub is_public: bool,
    pub status: OrderStatus,
    pub creation_tx: Option<B256>,
}

impl OrderTrade {
    pub fn reference(&self) -> OrderRef {
        OrderRef {
            chain: self.chain,
            contract: self.contract,
            memo: self.memo,
            stop_date: self.stop_date,
        }
    }
}

/// Enough of an order to read its on-chain status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    pub chain: ChainName,
    pub contract: Address,
    pub memo: B256,
    pub stop_date: TimestampMs,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBookConfig {
    pub contracts: BTreeMap<ChainName, Address>,
}

impl OrderBookConfig {
    pub fn contract(&self, chain: ChainName) -> Result<Address, Error> {
        self.contracts
            .get(&chain)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("order-book contract on {chain}")))
    }
}

pub struct OrderBookService {
    connector: Arc<ProviderConnector>,
    clients: ChainClients,
    clock: Arc<dyn ClockPort>,
    api: Arc<dyn OrderBookApiPort>,
    config: OrderBookConfig,
    poll: PollSettings,
}

fn record_field<T: FromStr>(raw: &str, field: &str) -> Result<T, Error> {
    raw.parse().map_err(|_| {
        Error::provider(
            "reading order record",
            PortError::Validation(format!("invalid {field}: {raw}")),
        )
    })
}

fn side(input: &OrderTokenInput) -> Result<OrderSide, Error> {
    let min = if input.min_contribution.trim().is_empty() {
        "0"
    } else {
        input.min_contribution.as_str()
    };
    Ok(OrderSide {
        address: input.address,
        decimals: input.decimals,
        limit: TokenAmount::parse(&input.amount, input.decimals)?,
        min_contribution: TokenAmount::parse(min, input.decimals)?,
        broker_percent: input.broker_percent,
    })
}

/// Broker share in the contract's unit, hundredths of a percent.
fn broker_basis_points(percent: u32) -> Result<u32, Error> {
    percent
        .checked_mul(100)
        .ok_or_else(|| Error::InvalidAmount(format!("broker percent {percent} is too large")))
}

/// Memo emitted as the first indexed topic of `OrderCreated`.
fn order_memo(receipt: &TxReceipt, contract: Address) -> Result<B256, Error> {
    let event = keccak256(ORDER_CREATED_EVENT.as_bytes());
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .find(|log| log.topics.first() == Some(&event))
        .and_then(|log| log.topics.get(1).copied())
        .ok_or_else(|| {
            Error::NotFound(format!("OrderCreated event in {}", receipt.transaction_hash))
        })
}

impl OrderBookService {
    pub fn new(
        connector: Arc<ProviderConnector>,
        clients: ChainClients,
        clock: Arc<dyn ClockPort>,
        api: Arc<dyn OrderBookApiPort>,
        config: OrderBookConfig,
    ) -> Self {
        Self {
            connector,
            clients,
            clock,
            api,
            config,
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    fn now_ms(&self) -> Result<u64, Error> {
        self.clock
            .now_ms()
            .map_err(|e| Error::provider("reading clock", e))
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderTrade, Error> {
        let ready = self.connector.ready_wallet(request.chain)?;
        let owner = ready.address;
        let contract = self.config.contract(ready.chain)?;
        let network = network_code(request.chain)?;
        let base = side(&request.base)?;
        let quote = side(&request.quote)?;
        let base_broker = broker_basis_points(base.broker_percent)?;
        let quote_broker = broker_basis_points(quote.broker_percent)?;
        let client = self.clients.client(ready.chain)?;

        let fee = client
            .read_u256(&ContractCall::new(contract, ORDER_BOOK_ABI, "feeAmount"))
            .await?;
        let broker = request.broker_address.unwrap_or(Address::ZERO);
        let call = ContractCall::new(contract, ORDER_BOOK_ABI, "createOrder")
            .arg(base.address.to_checksum(None))
            .arg(quote.address.to_checksum(None))
            .arg(base.limit.raw.to_string())
            .arg(quote.limit.raw.to_string())
            .arg((request.stop_date.0 / 1000).to_string())
            .arg(Address::ZERO.to_checksum(None))
            .arg(base.min_contribution.raw.to_string())
            .arg(quote.min_contribution.raw.to_string())
            .arg(broker.to_checksum(None))
            .arg(base_broker.to_string())
            .arg(quote_broker.to_string())
            .with_value(fee);

        let hash = submit_call(&ready.provider, &client, owner, &call).await?;
        info!(%hash, chain = %ready.chain, "order creation submitted");
        let receipt = wait_for_receipt(&client, hash, &self.poll).await?;
        let memo = order_memo(&receipt, contract)?;

        let record = OrderRecord {
            memo_contract: memo.to_string(),
            contract_address: contract.to_checksum(None),
            base_address: base.address.to_checksum(None),
            quote_address: quote.address.to_checksum(None),
            base_limit: base.limit.raw.to_string(),
            quote_limit: quote.limit.raw.to_string(),
            stop_date: request.stop_date.0,
            is_public: request.is_public,
            min_base_wei: base.min_contribution.raw.to_string(),
            min_quote_wei: quote.min_contribution.raw.to_string(),
            broker_fee: request.broker_address.is_some(),
            broker_fee_address: broker.to_checksum(None),
            broker_fee_base: base.broker_percent,
            broker_fee_quote: quote.broker_percent,
            name: format!("{} <> {}", request.base.symbol, request.quote.symbol),
            network,
            state: "ACTIVE".to_owned(),
            unique_link: None,
        };
        if let Err(e) = self.api.create_trade(&record).await {
            warn!(%memo, error = %e, "order created on chain but backend record failed");
            return Err(Error::network("posting order record", e));
        }

        Ok(OrderTrade {
            memo,
            chain: request.chain,
            contract,
            base,
            quote,
            stop_date: request.stop_date,
            is_public: request.is_public,
            status: OrderStatus::Active,
            creation_tx: Some(hash),
        })
    }

    fn status_source(&self, order: &OrderRef) -> Result<ContractSwapStatus, Error> {
        Ok(ContractSwapStatus::new(
            self.clients.client(order.chain)?,
            order.contract,
            ORDER_BOOK_ABI,
            order.memo,
        ))
    }

    /// Expired once the stop date passes; otherwise read from the contract.
    pub async fn order_status(&self, trade: &OrderTrade) -> Result<OrderStatus, Error> {
        self.status_of(&trade.reference()).await
    }

    /// Status of an order known only by where it lives and when it stops.
    pub async fn status_of(&self, order: &OrderRef) -> Result<OrderStatus, Error> {
        if order.stop_date.0 <= self.now_ms()? {
            return Ok(OrderStatus::Expired);
        }
        let status = self.status_source(order)?.poll().await?;
        order_status_from(status)
    }

    /// Polls until the order is done, cancelled, or past its stop date.
    pub async fn await_order(&self, trade: &OrderTrade) -> Result<OrderStatus, Error> {
        let source = self.status_source(&trade.reference())?;
        let status = await_settlement(
            &source,
            self.poll.status_interval,
            Some(trade.stop_date),
            self.clock.as_ref(),
            self.poll.max_poll_errors,
        )
        .await?;
        order_status_from(status)
    }

    /// Base and quote amounts raised so far.
    pub async fn amounts_contributed(
        &self,
        trade: &OrderTrade,
    ) -> Result<(TokenAmount, TokenAmount), Error> {
        let client = self.clients.client(trade.chain)?;
        let base = self.read_memo_u256(&client, trade, "baseRaised").await?;
        let quote = self.read_memo_u256(&client, trade, "quoteRaised").await?;
        Ok((
            TokenAmount::new(base, trade.base.decimals),
            TokenAmount::new(quote, trade.quote.decimals),
        ))
    }

    pub async fn investors_count(&self, trade: &OrderTrade) -> Result<(usize, usize), Error> {
        let client = self.clients.client(trade.chain)?;
        let base = client
            .read_array_len(&memo_call(trade, "baseInvestors"))
            .await?;
        let quote = client
            .read_array_len(&memo_call(trade, "quoteInvestors"))
            .await?;
        Ok((base, quote))
    }

    async fn read_memo_u256(
        &self,
        client: &ContractClient,
        trade: &OrderTrade,
        method: &str,
    ) -> Result<U256, Error> {
        client.read_u256(&memo_call(trade, method)).await
    }

    async fn token_decimals(&self, client: &ContractClient, token: Address) -> Result<u8, Error> {
        if token == Address::ZERO {
            return Ok(18);
        }
        let raw = client.read_u256(&erc20_decimals_call(token)).await?;
        u8::try_from(raw).map_err(|_| Error::NotFound(format!("decimals of {token}")))
    }

    async fn order_side(
        &self,
        client: &ContractClient,
        address: &str,
        limit: &str,
        min: &str,
        broker_percent: u32,
    ) -> Result<OrderSide, Error> {
        let address: Address = record_field(address, "token address")?;
        let decimals = self.token_decimals(client, address).await?;
        Ok(OrderSide {
            address,
            decimals,
            limit: TokenAmount::new(record_field(limit, "limit")?, decimals),
            min_contribution: TokenAmount::new(record_field(min, "min contribution")?, decimals),
            broker_percent,
        })
    }

    /// Loads a trade by its shareable link and refreshes its status.
    pub async fn order_by_link(&self, unique_link: &str) -> Result<OrderTrade, Error> {
        let record = self
            .api
            .trade(unique_link)
            .await
            .map_err(|e| Error::network(format!("loading trade {unique_link}"), e))?;
        let chain = chain_for_network_code(record.network)?;
        let client = self.clients.client(chain)?;
        let base = self
            .order_side(
                &client,
                &record.base_address,
                &record.base_limit,
                &record.min_base_wei,
                record.broker_fee_base,
            )
            .await?;
        let quote = self
            .order_side(
                &client,
                &record.quote_address,
                &record.quote_limit,
                &record.min_quote_wei,
                record.broker_fee_quote,
            )
            .await?;
        let mut trade = OrderTrade {
            memo: record_field(&record.memo_contract, "memo")?,
            chain,
            contract: record_field(&record.contract_address, "contract address")?,
            base,
            quote,
            stop_date: TimestampMs(record.stop_date),
            is_public: record.is_public,
            status: OrderStatus::Active,
            creation_tx: None,
        };
        trade.status = self.order_status(&trade).await?;
        Ok(trade)
    }
}

fn memo_call(trade: &OrderTrade, method: &str) -> ContractCall {
    ContractCall::new(trade.contract, ORDER_BOOK_ABI, method).arg(trade.memo.to_string())
}

fn order_status_from(status: SettlementStatus) -> Result<OrderStatus, Error> {
    match status {
        SettlementStatus::Pending => Ok(OrderStatus::Active),
        SettlementStatus::Completed { .. } => Ok(OrderStatus::Done),
        SettlementStatus::Cancelled => Ok(OrderStatus::Cancelled),
        SettlementStatus::Expired => Ok(OrderStatus::Expired),
        SettlementStatus::Failed(reason) => Err(Error::provider(
            "reading order status",
            PortError::Policy(reason),
        )),
    }
}
