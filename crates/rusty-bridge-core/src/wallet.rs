use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::chain::{parse_chain_id, Chain, ChainRegistry};
use crate::domain::{TxRequest, WalletKind, WalletSession, WatchAsset};
use crate::error::{ActivationFailure, Error};
use crate::notify::ReplayChannel;
use crate::ports::{
    PortError, WalletEvent, WalletEventSink, REQUEST_PENDING_ERROR_CODE, USER_REJECT_ERROR_CODE,
};

/// Contract every wallet integration implements.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> WalletKind;
    fn session(&self) -> &Arc<SessionCell>;

    /// Presence of the wallet object, or for relay-only wallets whether the
    /// relay answers at all.
    async fn is_installed(&self) -> bool;

    fn is_active(&self) -> bool {
        self.session().is_active()
    }

    fn address(&self) -> Option<Address> {
        self.session().address()
    }

    fn chain(&self) -> Option<Chain> {
        self.session().chain()
    }

    async fn activate(&self, params: Option<Value>) -> Result<(), Error>;
    async fn deactivate(&self) -> Result<(), Error>;
    async fn request_permissions(&self) -> Vec<Value>;
    async fn add_token(&self, asset: &WatchAsset) -> Result<(), Error>;
    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, Error>;

    async fn switch_chain(&self, chain: &Chain) -> Result<(), Error> {
        Err(Error::UnsupportedNetwork {
            required: chain.name,
            kind: self.kind(),
        })
    }

    /// Ends the external session when another wallet kind replaces this one.
    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Reconnects without prompting the user. `Ok(false)` when nothing to resume.
    async fn resume(&self) -> Result<bool, Error> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletTimeouts {
    pub activation: Duration,
    pub request: Duration,
}

impl Default for WalletTimeouts {
    fn default() -> Self {
        Self {
            activation: Duration::from_secs(120),
            request: Duration::from_secs(60),
        }
    }
}

/// The connector-owned channels every provider publishes into.
#[derive(Debug)]
pub struct WalletChannels {
    pub address: ReplayChannel<Option<Address>>,
    pub chain: ReplayChannel<Option<Chain>>,
}

impl Default for WalletChannels {
    fn default() -> Self {
        Self {
            address: ReplayChannel::new(None),
            chain: ReplayChannel::new(None),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    enabled: bool,
    address: Option<Address>,
    chain: Option<Chain>,
    detached: bool,
}

/// Session state of one provider instance, wired to the connector's channels.
#[derive(Debug)]
pub struct SessionCell {
    kind: WalletKind,
    chains: Arc<ChainRegistry>,
    channels: Arc<WalletChannels>,
    state: Mutex<SessionState>,
}

impl SessionCell {
    pub fn new(
        kind: WalletKind,
        chains: Arc<ChainRegistry>,
        channels: Arc<WalletChannels>,
    ) -> Self {
        Self {
            kind,
            chains,
            channels,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn kind(&self) -> WalletKind {
        self.kind
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        if state.detached {
            return;
        }
        self.channels.address.publish(state.address);
        self.channels.chain.publish(state.chain.clone());
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_active(&self) -> bool {
        let state = self.lock();
        state.enabled && state.address.is_some()
    }

    pub fn address(&self) -> Option<Address> {
        let state = self.lock();
        state.enabled.then_some(state.address).flatten()
    }

    pub fn chain(&self) -> Option<Chain> {
        let state = self.lock();
        if state.enabled {
            state.chain.clone()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> WalletSession {
        let state = self.lock();
        WalletSession {
            provider_kind: self.kind,
            address: state.enabled.then_some(state.address).flatten(),
            chain: state.enabled.then(|| state.chain.clone()).flatten(),
            is_enabled: state.enabled,
        }
    }

    pub fn resolve_chain(&self, id: u64) -> Option<Chain> {
        match self.chains.by_id(id) {
            Ok(chain) => Some(chain.clone()),
            Err(_) => {
                warn!(chain_id = id, kind = %self.kind, "wallet reported an unknown chain");
                None
            }
        }
    }

    pub fn enable(&self, address: Address, chain_id: u64) {
        let chain = self.resolve_chain(chain_id);
        let mut state = self.lock();
        state.enabled = true;
        state.address = Some(address);
        state.chain = chain;
        self.publish(&state);
        debug!(kind = %self.kind, %address, chain_id, "wallet session enabled");
    }

    /// Clears the session; emits `None` only if it was enabled.
    pub fn disable(&self) {
        let mut state = self.lock();
        let was_enabled = state.enabled;
        state.enabled = false;
        state.address = None;
        state.chain = None;
        if was_enabled {
            self.publish(&state);
            debug!(kind = %self.kind, "wallet session disabled");
        }
    }

    pub fn observe_accounts(&self, accounts: &[Address]) {
        let Some(first) = accounts.first().copied() else {
            self.disable();
            return;
        };
        let mut state = self.lock();
        state.address = Some(first);
        if state.enabled && !state.detached {
            self.channels.address.publish(Some(first));
        }
    }

    pub fn observe_chain(&self, chain_id: u64) {
        let chain = self.resolve_chain(chain_id);
        let mut state = self.lock();
        state.chain = chain.clone();
        if state.enabled && !state.detached {
            self.channels.chain.publish(chain);
        }
    }

    /// Stops this cell from publishing; used when the connector swaps providers.
    pub fn detach(&self) {
        self.lock().detached = true;
    }

    pub fn event_sink(self: &Arc<Self>) -> WalletEventSink {
        let cell = Arc::clone(self);
        Arc::new(move |event| {
            debug!(kind = %cell.kind, ?event, "wallet event");
            match event {
                WalletEvent::ChainChanged(id) => cell.observe_chain(id),
                WalletEvent::AccountsChanged(accounts) => cell.observe_accounts(&accounts),
                WalletEvent::Disconnect => cell.disable(),
            }
        })
    }
}

pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PortError::Timeout(what.to_owned()))?
}

pub fn parse_accounts(value: &Value) -> Result<Vec<Address>, PortError> {
    let items = value
        .as_array()
        .ok_or_else(|| PortError::Validation(format!("expected account list, got {value}")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| PortError::Validation(format!("invalid account {item}")))
        })
        .collect()
}

pub fn parse_chain_value(value: &Value) -> Result<u64, PortError> {
    match value {
        Value::String(raw) => parse_chain_id(raw),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
    .ok_or_else(|| PortError::Validation(format!("invalid chain id {value}")))
}

pub fn parse_tx_hash(value: &Value) -> Result<B256, PortError> {
    value
        .as_str()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| PortError::Validation(format!("invalid transaction hash {value}")))
}

pub fn watch_asset_params(asset: &WatchAsset) -> Value {
    let mut options = json!({
        "address": asset.address.to_checksum(None),
        "symbol": asset.symbol,
        "decimals": asset.decimals,
    });
    if let Some(image) = &asset.image {
        options["image"] = json!(image);
    }
    json!({ "type": "ERC20", "options": options })
}

pub fn send_transaction_params(tx: &TxRequest) -> Value {
    let mut payload = json!({
        "from": tx.from.to_checksum(None),
        "to": tx.to.to_checksum(None),
        "value": format!("{:#x}", tx.value),
    });
    if !tx.data.is_empty() {
        payload["data"] = json!(tx.data.to_string());
    }
    json!([payload])
}

pub fn add_chain_params(chain: &Chain) -> Value {
    json!([{
        "chainId": chain.hex_id(),
        "chainName": chain.name.as_str(),
        "nativeCurrency": {
            "name": chain.native_coin.name,
            "symbol": chain.native_coin.symbol,
            "decimals": chain.native_coin.decimals,
        },
        "rpcUrls": [chain.rpc_endpoint],
        "blockExplorerUrls": [chain.explorer_url],
    }])
}

/// Maps a failed activation round-trip onto the activation taxonomy.
pub fn activation_error(kind: WalletKind, err: PortError) -> Error {
    let reason = match &err {
        PortError::Timeout(_) => ActivationFailure::TimedOut,
        PortError::Rpc { code, .. } if *code == USER_REJECT_ERROR_CODE => {
            ActivationFailure::UserRejected
        }
        PortError::Rpc { code, .. } if *code == REQUEST_PENDING_ERROR_CODE => {
            ActivationFailure::AlreadyPending
        }
        PortError::Rpc { .. } | PortError::Policy(_) => ActivationFailure::Unavailable,
        _ => return Error::provider(format!("activating {kind}"), err),
    };
    Error::WalletActivation { kind, reason }
}

pub fn send_error(err: PortError) -> Error {
    match err.rpc_code() {
        Some(USER_REJECT_ERROR_CODE) => Error::UserRejectedTransaction,
        _ => Error::provider("sending transaction", err),
    }
}

/// Shared `wallet_watchAsset` gate: active session on the token's chain.
pub fn check_watch_asset(session: &SessionCell, asset: &WatchAsset) -> Result<(), Error> {
    if !session.is_active() {
        return Err(Error::WalletNotConnected);
    }
    let active = session.chain().map(|c| c.name);
    if active != Some(asset.chain) {
        return Err(Error::ChainMismatch {
            token: asset.chain,
            active,
        });
    }
    Ok(())
}
