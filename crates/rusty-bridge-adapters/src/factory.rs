use std::collections::HashMap;
use std::sync::Arc;

use rusty_bridge_core::{
    Chain, Error, SessionCell, SessionStorePort, WalletFactory, WalletHandle, WalletKind,
    WalletProvider, WalletTimeouts,
};

use crate::eip1193::BrowserExtensionProvider;
use crate::wallet_link::RelayWalletProvider;
use crate::wc::QrRelayProvider;

/// Builds the concrete provider for a wallet kind around whatever handle is
/// registered for it. A kind without a handle still builds; it reports
/// itself as not installed.
pub struct DefaultWalletFactory {
    handles: HashMap<WalletKind, Arc<dyn WalletHandle>>,
    store: Arc<dyn SessionStorePort>,
    timeouts: WalletTimeouts,
}

impl DefaultWalletFactory {
    pub fn new(store: Arc<dyn SessionStorePort>, timeouts: WalletTimeouts) -> Self {
        Self {
            handles: HashMap::new(),
            store,
            timeouts,
        }
    }

    pub fn with_handle(mut self, kind: WalletKind, handle: Arc<dyn WalletHandle>) -> Self {
        self.handles.insert(kind, handle);
        self
    }
}

impl WalletFactory for DefaultWalletFactory {
    fn create(
        &self,
        kind: WalletKind,
        chain_hint: Option<&Chain>,
        session: Arc<SessionCell>,
    ) -> Result<Arc<dyn WalletProvider>, Error> {
        let handle = self.handles.get(&kind).cloned();
        let provider: Arc<dyn WalletProvider> = match kind {
            WalletKind::BrowserExtension => Arc::new(BrowserExtensionProvider::new(
                handle,
                session,
                self.timeouts,
            )),
            WalletKind::RelayWallet => Arc::new(RelayWalletProvider::new(
                handle,
                session,
                self.timeouts,
                Arc::clone(&self.store),
                chain_hint,
            )),
            WalletKind::QrRelay => {
                Arc::new(QrRelayProvider::new(handle, session, self.timeouts))
            }
        };
        Ok(provider)
    }
}
