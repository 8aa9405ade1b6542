use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use alloy::primitives::Address;
use serde_json::Value;
use tracing::{info, warn};

use crate::chain::{Chain, ChainName, ChainRegistry};
use crate::domain::{WalletKind, WalletSession, WatchAsset};
use crate::error::Error;
use crate::notify::Subscription;
use crate::ports::SessionStorePort;
use crate::wallet::{SessionCell, WalletChannels, WalletProvider};

/// Session-store key holding the last connected wallet kind.
pub const PROVIDER_STORAGE_KEY: &str = "provider";

/// A wallet that passed `ready_wallet`, with the account and network it is on.
#[derive(Clone)]
pub struct ReadyWallet {
    pub provider: Arc<dyn WalletProvider>,
    pub address: Address,
    /// The wallet's network: `required` itself, or a testnet of it in testing mode.
    pub chain: ChainName,
}

/// Dispatch table from wallet kind to a concrete provider.
pub trait WalletFactory: Send + Sync {
    fn create(
        &self,
        kind: WalletKind,
        chain_hint: Option<&Chain>,
        session: Arc<SessionCell>,
    ) -> Result<Arc<dyn WalletProvider>, Error>;
}

/// Owns the single active wallet provider and its notification channels.
pub struct ProviderConnector {
    factory: Arc<dyn WalletFactory>,
    store: Arc<dyn SessionStorePort>,
    chains: Arc<ChainRegistry>,
    channels: Arc<WalletChannels>,
    active: RwLock<Option<Arc<dyn WalletProvider>>>,
    testing_mode: AtomicBool,
}

impl ProviderConnector {
    pub fn new(
        factory: Arc<dyn WalletFactory>,
        store: Arc<dyn SessionStorePort>,
        chains: Arc<ChainRegistry>,
    ) -> Self {
        Self {
            factory,
            store,
            chains,
            channels: Arc::new(WalletChannels::default()),
            active: RwLock::new(None),
            testing_mode: AtomicBool::new(false),
        }
    }

    pub fn chains(&self) -> &Arc<ChainRegistry> {
        &self.chains
    }

    pub fn set_testing_mode(&self, enabled: bool) {
        self.testing_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn testing_mode(&self) -> bool {
        self.testing_mode.load(Ordering::SeqCst)
    }

    pub fn provider(&self) -> Option<Arc<dyn WalletProvider>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_provider(&self) -> Result<Arc<dyn WalletProvider>, Error> {
        self.provider().ok_or(Error::WalletNotConnected)
    }

    pub fn session(&self) -> Option<WalletSession> {
        self.provider().map(|p| p.session().snapshot())
    }

    pub fn subscribe_address(&self) -> Subscription<Option<Address>> {
        self.channels.address.subscribe()
    }

    pub fn subscribe_chain(&self) -> Subscription<Option<Chain>> {
        self.channels.chain.subscribe()
    }

    /// Installs a provider of `kind`, replacing the active one. A replaced
    /// provider of another kind has its external session closed.
    pub async fn connect(
        &self,
        kind: WalletKind,
        chain_hint: Option<ChainName>,
    ) -> Result<Arc<dyn WalletProvider>, Error> {
        let hint = chain_hint
            .map(|name| self.chains.by_name(name).cloned())
            .transpose()?;
        let session = Arc::new(SessionCell::new(
            kind,
            Arc::clone(&self.chains),
            Arc::clone(&self.channels),
        ));
        let provider = self.factory.create(kind, hint.as_ref(), session)?;

        let previous = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            active.replace(Arc::clone(&provider))
        };
        if let Some(previous) = previous {
            previous.session().detach();
            self.channels.address.publish(None);
            self.channels.chain.publish(None);
            if previous.kind() != kind {
                if let Err(e) = previous.close().await {
                    warn!(previous = %previous.kind(), error = %e, "replaced wallet did not close");
                }
            }
        }

        if let Err(e) = self.store.set(PROVIDER_STORAGE_KEY, kind.as_str()) {
            warn!(error = %e, "failed to persist wallet kind");
        }
        info!(%kind, "wallet provider connected");
        Ok(provider)
    }

    /// Reconnects the persisted wallet kind and tries a silent resume.
    pub async fn install_from_storage(&self) -> Result<Option<WalletKind>, Error> {
        let stored = self
            .store
            .get(PROVIDER_STORAGE_KEY)
            .map_err(|e| Error::provider("reading persisted wallet kind", e))?;
        let Some(raw) = stored else {
            return Ok(None);
        };
        let kind = match raw.parse::<WalletKind>() {
            Ok(kind) => kind,
            Err(_) => {
                warn!(value = %raw, "discarding unknown persisted wallet kind");
                let _ = self.store.delete(PROVIDER_STORAGE_KEY);
                return Ok(None);
            }
        };
        let provider = self.connect(kind, None).await?;
        match provider.resume().await {
            Ok(true) => info!(%kind, "wallet session resumed"),
            Ok(false) => info!(%kind, "wallet requires activation"),
            Err(e) => warn!(%kind, error = %e, "silent wallet resume failed"),
        }
        Ok(Some(kind))
    }

    pub async fn activate(&self, params: Option<Value>) -> Result<(), Error> {
        let provider = self.require_provider()?;
        provider.activate(params).await
    }

    pub async fn deactivate(&self) -> Result<(), Error> {
        if let Some(provider) = self.provider() {
            provider.deactivate().await?;
        }
        if let Err(e) = self.store.delete(PROVIDER_STORAGE_KEY) {
            warn!(error = %e, "failed to clear persisted wallet kind");
        }
        Ok(())
    }

    pub async fn request_permissions(&self) -> Vec<Value> {
        match self.provider() {
            Some(provider) => provider.request_permissions().await,
            None => Vec::new(),
        }
    }

    pub async fn add_token(&self, asset: &WatchAsset) -> Result<(), Error> {
        let provider = self.require_provider()?;
        provider.add_token(asset).await
    }

    pub async fn switch_chain(&self, name: ChainName) -> Result<(), Error> {
        let chain = self.chains.by_name(name)?.clone();
        let provider = self.require_provider()?;
        provider.switch_chain(&chain).await
    }

    fn chain_matches(&self, required: ChainName, active: ChainName) -> bool {
        required == active || (self.testing_mode() && required.testnets().contains(&active))
    }

    pub fn check_ready(&self, required: ChainName) -> Result<(), Error> {
        self.ready_wallet(required).map(|_| ())
    }

    /// Like `check_ready`, also returning the wallet, address and network it validated.
    pub fn ready_wallet(&self, required: ChainName) -> Result<ReadyWallet, Error> {
        let provider = self.require_provider()?;
        let session = provider.session().snapshot();
        if !session.is_enabled {
            return Err(Error::WalletNotConnected);
        }
        let address = session.address.ok_or(Error::AccountMissing)?;
        let active = session.chain.map(|c| c.name);
        if let Some(chain) = active.filter(|active| self.chain_matches(required, *active)) {
            return Ok(ReadyWallet {
                provider,
                address,
                chain,
            });
        }
        if session.provider_kind.can_switch_network() {
            Err(Error::WrongNetwork { required, active })
        } else {
            Err(Error::UnsupportedNetwork {
                required,
                kind: session.provider_kind,
            })
        }
    }
}
