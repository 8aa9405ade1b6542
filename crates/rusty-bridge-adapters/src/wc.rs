//! QR-code relay wallet (WalletConnect v1 style). The relay reports rejections
//! as plain messages rather than EIP-1193 codes, so they are translated here.

use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use rusty_bridge_core::ports::USER_REJECT_ERROR_CODE;
use rusty_bridge_core::wallet::{activation_error, send_error};
use rusty_bridge_core::{
    Error, PortError, SessionCell, TxRequest, WalletHandle, WalletKind, WalletProvider,
    WalletTimeouts, WatchAsset,
};

use crate::connection::WalletConnection;

const REJECTION_MESSAGES: [&str; 3] = ["user rejected", "user closed modal", "user denied"];

/// Gives message-only rejections the standard 4001 code.
pub fn normalize_rejection(err: PortError) -> PortError {
    let message = match &err {
        PortError::Rpc { code, .. } if *code == USER_REJECT_ERROR_CODE => None,
        PortError::Rpc { message, .. } | PortError::Transport(message) => Some(message.clone()),
        _ => None,
    };
    match message {
        Some(message)
            if REJECTION_MESSAGES
                .iter()
                .any(|m| message.to_ascii_lowercase().contains(m)) =>
        {
            PortError::Rpc {
                code: USER_REJECT_ERROR_CODE,
                message,
            }
        }
        _ => err,
    }
}

fn send_error_from_relay(err: PortError) -> Error {
    send_error(normalize_rejection(err))
}

pub struct QrRelayProvider {
    conn: WalletConnection,
}

impl QrRelayProvider {
    pub fn new(
        handle: Option<Arc<dyn WalletHandle>>,
        session: Arc<SessionCell>,
        timeouts: WalletTimeouts,
    ) -> Self {
        Self {
            conn: WalletConnection {
                handle,
                session,
                timeouts,
            },
        }
    }

    /// Tears down the relay session and clears local state.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let closed = self.conn.close().await;
        self.conn.session.disable();
        closed.map_err(|e| Error::provider("closing qr relay session", e))
    }
}

#[async_trait]
impl WalletProvider for QrRelayProvider {
    fn kind(&self) -> WalletKind {
        WalletKind::QrRelay
    }

    fn session(&self) -> &Arc<SessionCell> {
        &self.conn.session
    }

    async fn is_installed(&self) -> bool {
        self.conn.is_reachable().await
    }

    async fn activate(&self, params: Option<Value>) -> Result<(), Error> {
        if !self.is_installed().await {
            return Err(Error::WalletNotInstalled(self.kind()));
        }
        self.conn.listen();
        let address = self
            .conn
            .request_accounts(params)
            .await
            .map_err(|e| activation_error(self.kind(), normalize_rejection(e)))?;
        let chain_id = self
            .conn
            .chain_id()
            .await
            .map_err(|e| activation_error(self.kind(), normalize_rejection(e)))?;
        self.conn.session.enable(address, chain_id);
        info!(kind = %self.kind(), %address, chain_id, "wallet activated");
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), Error> {
        if let Err(e) = self.disconnect().await {
            warn!(error = %e, "qr relay session did not close cleanly");
        }
        Ok(())
    }

    async fn request_permissions(&self) -> Vec<Value> {
        self.conn.request_permissions().await
    }

    async fn add_token(&self, asset: &WatchAsset) -> Result<(), Error> {
        self.conn.add_token(asset).await
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<B256, Error> {
        self.conn.send_transaction(tx, send_error_from_relay).await
    }

    async fn close(&self) -> Result<(), Error> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::provider("closing qr relay session", e))
    }

    async fn resume(&self) -> Result<bool, Error> {
        self.conn.resume().await
    }
}
