use std::sync::Arc;

use alloy::primitives::{Address, B256};
use serde_json::{json, Value};
use tracing::{debug, warn};

use rusty_bridge_core::wallet::{
    check_watch_asset, parse_accounts, parse_chain_value, parse_tx_hash, send_transaction_params,
    watch_asset_params, with_timeout,
};
use rusty_bridge_core::{
    Error, PortError, SessionCell, TxRequest, WalletHandle, WalletKind, WalletTimeouts, WatchAsset,
};

/// Request plumbing every handle-backed provider shares.
pub(crate) struct WalletConnection {
    pub handle: Option<Arc<dyn WalletHandle>>,
    pub session: Arc<SessionCell>,
    pub timeouts: WalletTimeouts,
}

impl WalletConnection {
    pub fn kind(&self) -> WalletKind {
        self.session.kind()
    }

    pub fn is_available(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_available())
    }

    /// The relay answers `eth_chainId` within the request timeout. An RPC
    /// error still counts as an answer.
    pub async fn is_reachable(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        match self.request("eth_chainId", json!([])).await {
            Ok(_) | Err(PortError::Rpc { .. }) => true,
            Err(e) => {
                debug!(kind = %self.kind(), error = %e, "wallet relay unreachable");
                false
            }
        }
    }

    pub fn handle(&self) -> Result<&Arc<dyn WalletHandle>, Error> {
        self.handle
            .as_ref()
            .filter(|h| h.is_available())
            .ok_or(Error::WalletNotInstalled(self.kind()))
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| PortError::Policy(format!("{} handle missing", self.kind())))?;
        with_timeout(self.timeouts.request, method, handle.request(method, params)).await
    }

    pub async fn close(&self) -> Result<(), PortError> {
        match &self.handle {
            Some(handle) => handle.close().await,
            None => Ok(()),
        }
    }

    /// Registers the session's event sink. Handles that cannot push events
    /// still work, the session just goes stale until the next activation.
    pub fn listen(&self) {
        let Some(handle) = &self.handle else {
            return;
        };
        if let Err(e) = handle.listen(self.session.event_sink()) {
            warn!(kind = %self.kind(), error = %e, "wallet events unavailable");
        }
    }

    /// `eth_requestAccounts` under the activation timeout; the first account wins.
    pub async fn request_accounts(&self, params: Option<Value>) -> Result<Address, PortError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| PortError::Policy(format!("{} handle missing", self.kind())))?;
        let params = params.unwrap_or_else(|| json!([]));
        let raw = with_timeout(
            self.timeouts.activation,
            "eth_requestAccounts",
            handle.request("eth_requestAccounts", params),
        )
        .await?;
        parse_accounts(&raw)?
            .first()
            .copied()
            .ok_or_else(|| PortError::Policy("wallet returned no accounts".to_owned()))
    }

    pub async fn chain_id(&self) -> Result<u64, PortError> {
        let raw = self.request("eth_chainId", json!([])).await?;
        parse_chain_value(&raw)
    }

    /// Silent reconnect through `eth_accounts`; `false` when not authorized.
    pub async fn resume(&self) -> Result<bool, Error> {
        if !self.is_available() {
            return Ok(false);
        }
        let context = format!("resuming {}", self.kind());
        let raw = self
            .request("eth_accounts", json!([]))
            .await
            .map_err(|e| Error::provider(context.clone(), e))?;
        let accounts = parse_accounts(&raw).map_err(|e| Error::provider(context.clone(), e))?;
        let Some(address) = accounts.first().copied() else {
            return Ok(false);
        };
        let chain_id = self
            .chain_id()
            .await
            .map_err(|e| Error::provider(context, e))?;
        self.listen();
        self.session.enable(address, chain_id);
        Ok(true)
    }

    pub async fn request_permissions(&self) -> Vec<Value> {
        if !self.is_available() {
            return Vec::new();
        }
        let params = json!([{ "eth_accounts": {} }]);
        match self.request("wallet_requestPermissions", params).await {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                warn!(kind = %self.kind(), result = %other, "unexpected permissions result");
                Vec::new()
            }
            Err(e) => {
                warn!(kind = %self.kind(), error = %e, "permission request failed");
                Vec::new()
            }
        }
    }

    pub async fn add_token(&self, asset: &WatchAsset) -> Result<(), Error> {
        check_watch_asset(&self.session, asset)?;
        self.request("wallet_watchAsset", watch_asset_params(asset))
            .await
            .map_err(|e| Error::provider(format!("watching {}", asset.symbol), e))?;
        Ok(())
    }

    /// Submits through `eth_sendTransaction`; `translate` maps wallet errors.
    pub async fn send_transaction(
        &self,
        tx: &TxRequest,
        translate: fn(PortError) -> Error,
    ) -> Result<B256, Error> {
        if !self.session.is_active() {
            return Err(Error::WalletNotConnected);
        }
        let handle = self.handle()?;
        // Confirmation waits on the user, so it gets the activation budget.
        let raw = with_timeout(
            self.timeouts.activation,
            "eth_sendTransaction",
            handle.request("eth_sendTransaction", send_transaction_params(tx)),
        )
        .await
        .map_err(translate)?;
        parse_tx_hash(&raw).map_err(|e| Error::provider("reading transaction hash", e))
    }
}
