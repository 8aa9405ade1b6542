use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::chain::ChainName;
use crate::domain::{TimestampMs, TokenAmount};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    Created,
    BalanceChecked,
    Approved,
    SourceSubmitted,
    AwaitingRelay,
    /// Source burn is checkpointed; the user has to claim on the destination.
    AwaitingClaim,
    Claiming,
    DestinationConfirmed,
    Expired,
    Failed,
    Cancelled,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TxState::DestinationConfirmed | TxState::Expired | TxState::Failed | TxState::Cancelled
        )
    }

    /// States a run stops in: terminal ones and those waiting on the user.
    pub fn ends_run(self) -> bool {
        self.is_terminal() || self == TxState::AwaitingClaim
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxAction {
    CheckBalance,
    Approve,
    Submit,
    AwaitRelay,
    Checkpoint,
    Claim,
    Confirm,
    Expire,
    Cancel,
    Fail,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: TxState,
    pub to: TxState,
    pub reason: String,
}

/// Transition table shared by every bridge topology. `Retry` is resolved by
/// `BridgeTransaction::retry`, which knows the step that failed.
pub fn tx_transition(from: TxState, action: TxAction) -> Result<TxState, Error> {
    use TxAction as A;
    use TxState as S;

    let to = match (from, action) {
        (S::Created, A::CheckBalance) => S::BalanceChecked,
        (S::BalanceChecked, A::Approve) => S::Approved,
        (S::BalanceChecked | S::Approved, A::Submit) => S::SourceSubmitted,
        (S::SourceSubmitted, A::AwaitRelay) => S::AwaitingRelay,
        (S::AwaitingRelay, A::Checkpoint) => S::AwaitingClaim,
        (S::AwaitingClaim, A::Claim) => S::Claiming,
        (S::SourceSubmitted | S::AwaitingRelay | S::Claiming, A::Confirm) => {
            S::DestinationConfirmed
        }
        (S::SourceSubmitted | S::AwaitingRelay, A::Cancel) => S::Cancelled,
        (
            S::Created | S::BalanceChecked | S::Approved | S::SourceSubmitted | S::AwaitingRelay,
            A::Expire,
        ) => S::Expired,
        (s, A::Fail) if !s.is_terminal() => S::Failed,
        _ => return Err(Error::IllegalTransition { from, action }),
    };
    Ok(to)
}

/// The resumable unit of work a bridge provider drives to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransaction {
    pub id: String,
    pub source_chain: ChainName,
    pub destination_chain: ChainName,
    /// Network the source side runs on; a testnet of `source_chain` in testing mode.
    pub source_network: ChainName,
    pub destination_network: ChainName,
    pub token: String,
    /// Source-chain address of the token; the zero address for the native coin.
    pub token_address: String,
    pub amount: TokenAmount,
    pub source_address: Address,
    pub destination_address: String,
    pub state: TxState,
    pub source_tx_hash: Option<B256>,
    /// Block the source transaction was mined in.
    pub source_block: Option<u64>,
    pub destination_tx_hash: Option<String>,
    pub claim_tx_hash: Option<B256>,
    /// Relay swap id or order memo, once one is assigned.
    pub memo: Option<String>,
    pub deposit_address: Option<String>,
    pub deadline: Option<TimestampMs>,
    pub failed_at: Option<TxState>,
    pub failure: Option<String>,
    pub history: Vec<StateTransition>,
}

impl BridgeTransaction {
    pub fn new(
        id: String,
        source_chain: ChainName,
        destination_chain: ChainName,
        token: String,
        amount: TokenAmount,
        source_address: Address,
        destination_address: String,
    ) -> Self {
        Self {
            id,
            source_chain,
            destination_chain,
            source_network: source_chain,
            destination_network: destination_chain,
            token,
            token_address: String::new(),
            amount,
            source_address,
            destination_address,
            state: TxState::Created,
            source_tx_hash: None,
            source_block: None,
            destination_tx_hash: None,
            claim_tx_hash: None,
            memo: None,
            deposit_address: None,
            deadline: None,
            failed_at: None,
            failure: None,
            history: Vec::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: TimestampMs) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_networks(mut self, source: ChainName, destination: ChainName) -> Self {
        self.source_network = source;
        self.destination_network = destination;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn apply(&mut self, action: TxAction, reason: &str) -> Result<TxState, Error> {
        if action == TxAction::Expire && self.deadline.is_none() {
            return Err(Error::IllegalTransition {
                from: self.state,
                action,
            });
        }
        if action == TxAction::Retry {
            return self.retry();
        }
        let to = tx_transition(self.state, action)?;
        self.record(to, reason);
        Ok(to)
    }

    pub fn fail(&mut self, cause: &Error) -> Result<TxState, Error> {
        let from = self.state;
        let to = tx_transition(from, TxAction::Fail)?;
        self.failed_at = Some(from);
        self.failure = Some(cause.to_string());
        self.record(to, "failed");
        Ok(to)
    }

    /// Moves a failed transaction back to the step it failed in.
    pub fn retry(&mut self) -> Result<TxState, Error> {
        let resume_at = match (self.state, self.failed_at) {
            (TxState::Failed, Some(step)) => step,
            (from, _) => {
                return Err(Error::IllegalTransition {
                    from,
                    action: TxAction::Retry,
                })
            }
        };
        self.failed_at = None;
        self.failure = None;
        self.record(resume_at, "retry");
        Ok(resume_at)
    }

    fn record(&mut self, to: TxState, reason: &str) {
        self.history.push(StateTransition {
            from: self.state,
            to,
            reason: reason.to_owned(),
        });
        self.state = to;
    }
}
