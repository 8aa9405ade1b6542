//! Injected browser-extension wallet (MetaMask and compatibles).

use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use rusty_bridge_core::ports::UNRECOGNIZED_CHAIN_ERROR_CODE;
use rusty_bridge_core::wallet::{activation_error, add_chain_params, send_error};
use rusty_bridge_core::{
    Chain, Error, SessionCell, TxRequest, WalletHandle, WalletKind, WalletProvider,
    WalletTimeouts, WatchAsset,
};

use crate::connection::WalletConnection;

pub struct BrowserExtensionProvider {
    conn: WalletConnection,
}

impl BrowserExtensionProvider {
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
}

#[async_trait]
impl WalletProvider for BrowserExtensionProvider {
    fn kind(&self) -> WalletKind {
        WalletKind::BrowserExtension
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
        let chain_id = self
            .conn
            .chain_id()
            .await
            .map_err(|e| activation_error(self.kind(), e))?;
        self.conn.session.enable(address, chain_id);
        info!(kind = %self.kind(), %address, chain_id, "wallet activated");
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), Error> {
        self.conn.session.disable();
        Ok(())
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

    /// `wallet_switchEthereumChain`, registering the chain first if the wallet
    /// does not know it (error 4902).
    async fn switch_chain(&self, chain: &Chain) -> Result<(), Error> {
        self.conn.handle()?;
        let context = format!("switching to {}", chain.name);
        let switch = self
            .conn
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": chain.hex_id() }]),
            )
            .await;
        match switch {
            Ok(_) => {}
            Err(e) if e.rpc_code() == Some(UNRECOGNIZED_CHAIN_ERROR_CODE) => {
                debug!(chain = %chain.name, "chain unknown to wallet, adding it");
                self.conn
                    .request("wallet_addEthereumChain", add_chain_params(chain))
                    .await
                    .map_err(|e| Error::provider(context.clone(), e))?;
            }
            Err(e) => return Err(Error::provider(context, e)),
        }
        self.conn.session.observe_chain(chain.id);
        Ok(())
    }

    async fn resume(&self) -> Result<bool, Error> {
        self.conn.resume().await
    }
}
