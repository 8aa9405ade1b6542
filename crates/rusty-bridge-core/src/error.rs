use alloy::primitives::B256;
use thiserror::Error;

use crate::bridge::{BridgeTransaction, TxAction, TxState};
use crate::chain::ChainName;
use crate::domain::WalletKind;
use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationFailure {
    UserRejected,
    TimedOut,
    AlreadyPending,
    Unavailable,
}

impl std::fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ActivationFailure::UserRejected => "user rejected the connection request",
            ActivationFailure::TimedOut => "wallet did not respond in time",
            ActivationFailure::AlreadyPending => "a connection request is already pending",
            ActivationFailure::Unavailable => "wallet refused the connection",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} wallet is not installed")]
    WalletNotInstalled(WalletKind),
    #[error("{kind} activation failed: {reason}")]
    WalletActivation {
        kind: WalletKind,
        reason: ActivationFailure,
    },
    #[error("wallet is not connected")]
    WalletNotConnected,
    #[error("no account is selected in the wallet")]
    AccountMissing,
    #[error("wrong network: switch the wallet to {required}")]
    WrongNetwork {
        required: ChainName,
        active: Option<ChainName>,
    },
    #[error("{kind} cannot switch networks; reconnect it on {required}")]
    UnsupportedNetwork { required: ChainName, kind: WalletKind },
    #[error("insufficient {symbol} balance: available {available}, requested {requested}")]
    InsufficientFunds {
        symbol: String,
        available: String,
        requested: String,
    },
    #[error("transaction rejected by user")]
    UserRejectedTransaction,
    #[error("token belongs to {token}, wallet is on {active:?}")]
    ChainMismatch {
        token: ChainName,
        active: Option<ChainName>,
    },
    #[error("unknown chain: {0}")]
    UnknownChain(String),
    #[error("bridge {from} -> {to} is not supported")]
    BridgePairUnsupported {
        from: ChainName,
        to: ChainName,
        suggested: Option<(ChainName, ChainName)>,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount {amount} {symbol} is outside the allowed range {min}..{max}")]
    AmountOutOfRange {
        symbol: String,
        amount: String,
        min: String,
        max: String,
    },
    #[error("illegal transaction transition {from:?} --{action:?}-->")]
    IllegalTransition { from: TxState, action: TxAction },
    #[error("transaction {0} reverted")]
    TransactionReverted(B256),
    #[error("network error while {context}: {source}")]
    Network {
        context: String,
        #[source]
        source: PortError,
    },
    #[error("wallet provider error while {context}: {source}")]
    Provider {
        context: String,
        #[source]
        source: PortError,
    },
    #[error(
        "bridge transaction {} failed in {:?}: {cause}",
        .transaction.id,
        .transaction.failed_at
    )]
    TransactionFailed {
        transaction: Box<BridgeTransaction>,
        #[source]
        cause: Box<Error>,
    },
    #[error("background task aborted: {0}")]
    Task(String),
}

impl Error {
    pub fn network(context: impl Into<String>, source: PortError) -> Self {
        Error::Network {
            context: context.into(),
            source,
        }
    }

    pub fn provider(context: impl Into<String>, source: PortError) -> Self {
        Error::Provider {
            context: context.into(),
            source,
        }
    }

    /// Innermost error, looking through `TransactionFailed`.
    pub fn cause(&self) -> &Error {
        match self {
            Error::TransactionFailed { cause, .. } => cause.cause(),
            other => other,
        }
    }

    pub fn transaction(&self) -> Option<&BridgeTransaction> {
        match self {
            Error::TransactionFailed { transaction, .. } => Some(transaction),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self.cause(),
            Error::UserRejectedTransaction
                | Error::WalletActivation {
                    reason: ActivationFailure::UserRejected,
                    ..
                }
        )
    }
}
