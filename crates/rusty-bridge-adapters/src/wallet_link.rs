//! Relay wallet reached through a linking service (Coinbase WalletLink style).
//! The link survives reloads through a marker in the session store.

use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use rusty_bridge_core::wallet::{activation_error, send_error};
use rusty_bridge_core::{
    Chain, Error, SessionCell, SessionStorePort, TxRequest, WalletHandle, WalletKind,
    WalletProvider, WalletTimeouts, WatchAsset,
};

use crate::connection::WalletConnection;

/// Written on activation, removed on deactivation; its presence makes resume possible.
pub const LINKED_ADDRESS_KEY: &str = "walletlink:addresses";

/// Chain the link is opened on when no hint is given.
pub const DEFAULT_CHAIN_ID: u64 = 1;

pub struct RelayWalletProvider {
    conn: WalletConnection,
    store: Arc<dyn SessionStorePort>,
    chain_hint: u64,
}

impl RelayWalletProvider {
    pub fn new(
        handle: Option<Arc<dyn WalletHandle>>,
        session: Arc<SessionCell>,
        timeouts: WalletTimeouts,
        store: Arc<dyn SessionStorePort>,
        chain_hint: Option<&Chain>,
    ) -> Self {
        Self {
            conn: WalletConnection {
                handle,
                session,
                timeouts,
            },
            store,
            chain_hint: chain_hint.map(|c| c.id).unwrap_or(DEFAULT_CHAIN_ID),
        }
    }

    pub fn chain_hint(&self) -> u64 {
        self.chain_hint
    }

    fn is_linked(&self) -> bool {
        match self.store.get(LINKED_ADDRESS_KEY) {
            Ok(marker) => marker.is_some(),
            Err(e) => {
                warn!(error = %e, "failed to read wallet link marker");
                false
            }
        }
    }
}

#[async_trait]
impl WalletProvider for RelayWalletProvider {
    fn kind(&self) -> WalletKind {
        WalletKind::RelayWallet
    }

    fn session(&self) -> &Arc<SessionCell> {
        &self.conn.session
    }

    async fn is_installed(&self) -> bool {
        self.conn.is_available()
    }

    async fn activate(&self, params: Option<Value>) -> Result<(), Error> {
        self.conn.handle()?;
        self.conn.listen();
        let address = self
            .conn
            .request_accounts(params)
            .await
            .map_err(|e| activation_error(self.kind(), e))?;
        let chain_id = match self.conn.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, hint = self.chain_hint, "linked wallet did not report a chain");
                self.chain_hint
            }
        };
        if let Err(e) = self
            .store
            .set(LINKED_ADDRESS_KEY, &address.to_checksum(None))
        {
            warn!(error = %e, "failed to persist wallet link marker");
        }
        self.conn.session.enable(address, chain_id);
        info!(kind = %self.kind(), %address, chain_id, "wallet activated");
        Ok(())
    }

    /// Closes the link and forgets it; the session is cleared even if closing fails.
    async fn deactivate(&self) -> Result<(), Error> {
        let closed = self.conn.close().await;
        if let Err(e) = self.store.delete(LINKED_ADDRESS_KEY) {
            warn!(error = %e, "failed to clear wallet link marker");
        }
        self.conn.session.disable();
        closed.map_err(|e| Error::provider("closing wallet link", e))
    }

    async fn request_permissions(&self) -> Vec<Value> {
        self.conn.request_permissions().await
    }

    async fn add_token(&self, asset: &WatchAsset) -> Result<(), Error> {
        self.conn.add_token(asset).await
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, Error> {
        self.conn.send_transaction(tx, send_error).await
    }

    async fn close(&self) -> Result<(), Error> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::provider("closing wallet link", e))
    }

    async fn resume(&self) -> Result<bool, Error> {
        if !self.is_linked() {
            return Ok(false);
        }
        self.conn.resume().await
    }
}
