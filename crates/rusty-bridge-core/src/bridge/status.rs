//! Settlement polling shared by the bridge topologies and the order book.

use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use tracing::debug;

use crate::contracts::{flag_call, ContractClient};
use crate::domain::TimestampMs;
use crate::error::Error;
use crate::ports::ClockPort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Completed { destination_tx: Option<String> },
    Cancelled,
    Failed(String),
    /// Produced by `await_settlement` once the deadline passes.
    Expired,
}

impl SettlementStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SettlementStatus::Pending)
    }
}

/// Where settlement is observed: a contract read or a REST endpoint.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll(&self) -> Result<SettlementStatus, Error>;
}

/// `isSwapped(id)` / `isCancelled(id)` flags on a bridge or order contract.
#[derive(Clone)]
pub struct ContractSwapStatus {
    client: ContractClient,
    contract: Address,
    abi: &'static str,
    id: B256,
}

impl ContractSwapStatus {
    pub fn new(client: ContractClient, contract: Address, abi: &'static str, id: B256) -> Self {
        Self {
            client,
            contract,
            abi,
            id,
        }
    }

    pub async fn is_swapped(&self) -> Result<bool, Error> {
        self.client
            .read_bool(&flag_call(self.contract, self.abi, "isSwapped", self.id))
            .await
    }

    pub async fn is_cancelled(&self) -> Result<bool, Error> {
        self.client
            .read_bool(&flag_call(self.contract, self.abi, "isCancelled", self.id))
            .await
    }
}

#[async_trait]
impl StatusSource for ContractSwapStatus {
    async fn poll(&self) -> Result<SettlementStatus, Error> {
        if self.is_swapped().await? {
            return Ok(SettlementStatus::Completed {
                destination_tx: None,
            });
        }
        if self.is_cancelled().await? {
            return Ok(SettlementStatus::Cancelled);
        }
        Ok(SettlementStatus::Pending)
    }
}

fn is_expired(clock: &dyn ClockPort, deadline: Option<TimestampMs>) -> Result<bool, Error> {
    let Some(TimestampMs(deadline)) = deadline else {
        return Ok(false);
    };
    let now = clock
        .now_ms()
        .map_err(|e| Error::provider("reading clock", e))?;
    Ok(deadline <= now)
}

/// Polls `source` until it leaves `Pending`. There is no timeout besides
/// `deadline`; more than `max_errors` consecutive poll failures end the wait.
pub async fn await_settlement(
    source: &dyn StatusSource,
    interval: Duration,
    deadline: Option<TimestampMs>,
    clock: &dyn ClockPort,
    max_errors: u32,
) -> Result<SettlementStatus, Error> {
    let mut errors = 0u32;
    loop {
        if is_expired(clock, deadline)? {
            return Ok(SettlementStatus::Expired);
        }
        match source.poll().await {
            Ok(status) if status.is_pending() => errors = 0,
            Ok(status) => return Ok(status),
            Err(e) => {
                errors += 1;
                if errors > max_errors {
                    return Err(e);
                }
                debug!(errors, error = %e, "settlement poll failed");
            }
        }
        tokio::time::sleep(interval).await;
    }
}
