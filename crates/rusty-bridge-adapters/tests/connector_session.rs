mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use rusty_bridge_adapters::wallet_link::LINKED_ADDRESS_KEY;
use rusty_bridge_adapters::{DefaultWalletFactory, DeterministicWallet, MemorySessionStore};
use rusty_bridge_core::ports::REQUEST_PENDING_ERROR_CODE;
use rusty_bridge_core::{
    ActivationFailure, ChainName, ChainRegistry, Error, ProviderConnector, SessionStorePort,
    WalletKind, WatchAsset, PROVIDER_STORAGE_KEY,
};

fn connector_for(wallet: &DeterministicWallet, timeout: Duration) -> ProviderConnector {
    let store = Arc::new(MemorySessionStore::default());
    let timeouts = rusty_bridge_core::WalletTimeouts {
        activation: timeout,
        request: timeout,
    };
    let factory = DefaultWalletFactory::new(store.clone(), timeouts)
        .with_handle(WalletKind::BrowserExtension, Arc::new(wallet.clone()));
    ProviderConnector::new(
        Arc::new(factory),
        store,
        Arc::new(ChainRegistry::default()),
    )
}

fn qr_connector_for(wallet: &DeterministicWallet, timeout: Duration) -> ProviderConnector {
    let store = Arc::new(MemorySessionStore::default());
    let timeouts = rusty_bridge_core::WalletTimeouts {
        activation: timeout,
        request: timeout,
    };
    let factory = DefaultWalletFactory::new(store.clone(), timeouts)
        .with_handle(WalletKind::QrRelay, Arc::new(wallet.clone()));
    ProviderConnector::new(
        Arc::new(factory),
        store,
        Arc::new(ChainRegistry::default()),
    )
}

fn usdt_asset(chain: ChainName) -> WatchAsset {
    WatchAsset {
        chain,
        address: usdt_eth(),
        symbol: "USDT".to_owned(),
        decimals: 6,
        image: None,
    }
}

#[tokio::test]
async fn activation_enables_the_session_and_persists_the_kind() {
    let h = harness();
    let mut addresses = h.runtime.connector.subscribe_address();
    assert_eq!(addresses.next().await, Some(None));

    h.connect_extension().await;

    let session = h.runtime.connector.session().expect("session");
    assert!(session.is_enabled);
    assert_eq!(session.address, Some(user()));
    assert_eq!(session.chain.map(|c| c.name), Some(ChainName::Ethereum));
    assert_eq!(
        h.store.get(PROVIDER_STORAGE_KEY).expect("store"),
        Some("METAMASK".to_owned())
    );
    assert_eq!(addresses.next().await, Some(Some(user())));

    let mut late = h.runtime.connector.subscribe_chain();
    let latest = late.next().await.expect("replayed");
    assert_eq!(latest.map(|c| c.id), Some(1));
}

#[tokio::test]
async fn user_rejection_maps_to_activation_failure() {
    let h = harness();
    h.wallet.reject_next_by_user().expect("script");
    h.runtime
        .connector
        .connect(WalletKind::BrowserExtension, None)
        .await
        .expect("connect");

    let err = h
        .runtime
        .connector
        .activate(None)
        .await
        .expect_err("rejected");
    assert!(err.is_user_rejection());
    assert!(h.runtime.connector.session().is_some_and(|s| !s.is_enabled));
}

#[tokio::test]
async fn pending_permission_prompt_is_reported() {
    let h = harness();
    h.wallet
        .reject_next(REQUEST_PENDING_ERROR_CODE, "Already processing eth_requestAccounts")
        .expect("script");
    h.runtime
        .connector
        .connect(WalletKind::BrowserExtension, None)
        .await
        .expect("connect");

    let err = h
        .runtime
        .connector
        .activate(None)
        .await
        .expect_err("pending");
    assert!(matches!(
        err,
        Error::WalletActivation {
            reason: ActivationFailure::AlreadyPending,
            ..
        }
    ));
}

#[tokio::test]
async fn unresponsive_wallet_times_out() {
    let wallet = DeterministicWallet::new(vec![user()], 1);
    wallet.set_unresponsive(true).expect("script");
    let connector = connector_for(&wallet, Duration::from_millis(20));
    connector
        .connect(WalletKind::BrowserExtension, None)
        .await
        .expect("connect");

    let err = connector.activate(None).await.expect_err("timed out");
    assert!(matches!(
        err,
        Error::WalletActivation {
            kind: WalletKind::BrowserExtension,
            reason: ActivationFailure::TimedOut,
        }
    ));
}

#[tokio::test]
async fn missing_or_disabled_extension_is_not_installed() {
    let h = harness();
    h.wallet.set_available(false).expect("script");
    let provider = h
        .runtime
        .connector
        .connect(WalletKind::BrowserExtension, None)
        .await
        .expect("connect succeeds without the extension");
    assert!(!provider.is_installed().await);

    let err = h
        .runtime
        .connector
        .activate(None)
        .await
        .expect_err("not installed");
    assert!(matches!(
        err,
        Error::WalletNotInstalled(WalletKind::BrowserExtension)
    ));
}

#[tokio::test]
async fn operations_without_a_provider_report_not_connected() {
    let h = harness();
    assert!(matches!(
        h.runtime.connector.activate(None).await,
        Err(Error::WalletNotConnected)
    ));
    assert!(matches!(
        h.runtime.connector.check_ready(ChainName::Ethereum),
        Err(Error::WalletNotConnected)
    ));
    assert!(h.runtime.connector.request_permissions().await.is_empty());
}

#[tokio::test]
async fn switching_to_a_known_chain_updates_the_session() {
    let h = harness_with_wallet(DeterministicWallet::new(vec![user()], 1).with_known_chains(&[56]));
    h.connect_extension().await;

    h.runtime
        .connector
        .switch_chain(ChainName::BinanceSmartChain)
        .await
        .expect("switch");
    assert_eq!(h.wallet.chain_id().expect("chain"), 56);
    assert!(h.runtime.connector.check_ready(ChainName::BinanceSmartChain).is_ok());
    assert!(!h
        .wallet
        .requested_methods()
        .expect("methods")
        .contains(&"wallet_addEthereumChain".to_owned()));
}

#[tokio::test]
async fn switching_to_an_unknown_chain_adds_it_first() {
    let h = harness();
    h.connect_extension().await;

    h.runtime
        .connector
        .switch_chain(ChainName::Polygon)
        .await
        .expect("switch");
    let methods = h.wallet.requested_methods().expect("methods");
    assert!(methods.contains(&"wallet_switchEthereumChain".to_owned()));
    assert!(methods.contains(&"wallet_addEthereumChain".to_owned()));
    let chain = h.runtime.connector.session().and_then(|s| s.chain);
    assert_eq!(chain.map(|c| c.name), Some(ChainName::Polygon));
}

#[tokio::test]
async fn relay_wallets_cannot_switch_networks() {
    let h = harness();
    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    h.runtime.connector.activate(None).await.expect("activate");

    let err = h
        .runtime
        .connector
        .switch_chain(ChainName::Polygon)
        .await
        .expect_err("qr relay cannot switch");
    assert!(matches!(
        err,
        Error::UnsupportedNetwork {
            required: ChainName::Polygon,
            kind: WalletKind::QrRelay,
        }
    ));
}

#[tokio::test]
async fn wallet_events_flow_into_the_session() {
    let h = harness();
    h.connect_extension().await;

    h.wallet.inject_chain_changed(56).expect("event");
    let chain = h.runtime.connector.session().and_then(|s| s.chain);
    assert_eq!(chain.map(|c| c.name), Some(ChainName::BinanceSmartChain));

    h.wallet
        .inject_accounts_changed(vec![other_user()])
        .expect("event");
    assert_eq!(
        h.runtime.connector.session().and_then(|s| s.address),
        Some(other_user())
    );

    h.wallet.inject_accounts_changed(Vec::new()).expect("event");
    let session = h.runtime.connector.session().expect("session");
    assert!(!session.is_enabled);
    assert_eq!(session.address, None);
}

#[tokio::test]
async fn unknown_wallet_chain_leaves_the_chain_empty() {
    let h = harness_with_wallet(DeterministicWallet::new(vec![user()], 31_337));
    h.connect_extension().await;

    let session = h.runtime.connector.session().expect("session");
    assert!(session.is_enabled);
    assert_eq!(session.chain, None);
    assert!(matches!(
        h.runtime.connector.check_ready(ChainName::Ethereum),
        Err(Error::WrongNetwork { active: None, .. })
    ));
}

#[tokio::test]
async fn testing_mode_accepts_the_matching_testnet() {
    let h = harness_with_wallet(DeterministicWallet::new(vec![user()], 5));
    h.connect_extension().await;

    assert!(h.runtime.connector.check_ready(ChainName::Ethereum).is_err());
    h.runtime.connector.set_testing_mode(true);
    assert!(h.runtime.connector.check_ready(ChainName::Ethereum).is_ok());
    assert!(h
        .runtime
        .connector
        .check_ready(ChainName::BinanceSmartChain)
        .is_err());
}

#[tokio::test]
async fn add_token_requires_the_token_chain() {
    let h = harness();
    h.connect_extension().await;

    h.runtime
        .connector
        .add_token(&usdt_asset(ChainName::Ethereum))
        .await
        .expect("watch asset");
    let watched = h.wallet.watched_assets().expect("watched");
    assert_eq!(watched.len(), 1);
    assert_eq!(watched[0]["type"], "ERC20");
    assert_eq!(watched[0]["options"]["symbol"], "USDT");

    let err = h
        .runtime
        .connector
        .add_token(&usdt_asset(ChainName::Polygon))
        .await
        .expect_err("wrong chain");
    assert!(matches!(
        err,
        Error::ChainMismatch {
            token: ChainName::Polygon,
            active: Some(ChainName::Ethereum),
        }
    ));
}

#[tokio::test]
async fn stored_kind_resumes_an_authorized_session_silently() {
    let h = harness_with_wallet(DeterministicWallet::new(vec![user()], 1).with_authorized());
    h.store
        .set(PROVIDER_STORAGE_KEY, "METAMASK")
        .expect("seed store");

    let kind = h
        .runtime
        .connector
        .install_from_storage()
        .await
        .expect("install");
    assert_eq!(kind, Some(WalletKind::BrowserExtension));
    let session = h.runtime.connector.session().expect("session");
    assert!(session.is_enabled);
    assert_eq!(session.address, Some(user()));
    assert!(!h
        .wallet
        .requested_methods()
        .expect("methods")
        .contains(&"eth_requestAccounts".to_owned()));
}

#[tokio::test]
async fn stored_kind_without_authorization_stays_inactive() {
    let h = harness();
    h.store
        .set(PROVIDER_STORAGE_KEY, "METAMASK")
        .expect("seed store");

    let kind = h
        .runtime
        .connector
        .install_from_storage()
        .await
        .expect("install");
    assert_eq!(kind, Some(WalletKind::BrowserExtension));
    assert!(h.runtime.connector.session().is_some_and(|s| !s.is_enabled));
}

#[tokio::test]
async fn unknown_stored_kind_is_discarded() {
    let h = harness();
    h.store
        .set(PROVIDER_STORAGE_KEY, "TREZOR")
        .expect("seed store");

    let kind = h
        .runtime
        .connector
        .install_from_storage()
        .await
        .expect("install");
    assert_eq!(kind, None);
    assert_eq!(h.store.get(PROVIDER_STORAGE_KEY).expect("store"), None);
    assert!(h.runtime.connector.provider().is_none());
}

#[tokio::test]
async fn relay_wallet_link_marker_gates_resume() {
    let h = harness_with_wallet(DeterministicWallet::new(vec![user()], 1).with_authorized());
    h.store
        .set(PROVIDER_STORAGE_KEY, "WALLET_LINK")
        .expect("seed store");

    h.runtime
        .connector
        .install_from_storage()
        .await
        .expect("install");
    assert!(h.runtime.connector.session().is_some_and(|s| !s.is_enabled));

    h.runtime.connector.activate(None).await.expect("activate");
    assert_eq!(
        h.store.get(LINKED_ADDRESS_KEY).expect("store"),
        Some(user().to_checksum(None))
    );

    h.runtime.connector.deactivate().await.expect("deactivate");
    assert_eq!(h.store.get(LINKED_ADDRESS_KEY).expect("store"), None);
    assert_eq!(h.store.get(PROVIDER_STORAGE_KEY).expect("store"), None);
    assert!(h.wallet.is_closed().expect("closed"));
}

#[tokio::test]
async fn reconnecting_replaces_the_provider_and_clears_published_state() {
    let h = harness();
    h.connect_extension().await;
    let mut addresses = h.runtime.connector.subscribe_address();
    assert_eq!(addresses.next().await, Some(Some(user())));

    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    assert_eq!(addresses.next().await, Some(None));

    // The old session is detached: its events no longer reach the channels.
    h.wallet.inject_chain_changed(56).expect("event");
    assert_eq!(h.runtime.connector.subscribe_chain().try_next(), Some(None));
    assert_eq!(
        h.runtime.connector.session().map(|s| s.provider_kind),
        Some(WalletKind::QrRelay)
    );
}

#[tokio::test]
async fn qr_relay_text_rejection_counts_as_user_rejection() {
    let h = harness();
    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    h.runtime.connector.activate(None).await.expect("activate");
    h.wallet
        .reject_next(-32000, "User rejected the transaction")
        .expect("script");

    let err = h
        .runtime
        .connector
        .provider()
        .expect("provider")
        .send_transaction(&rusty_bridge_core::TxRequest {
            from: user(),
            to: other_user(),
            value: units(1, 18),
            data: Default::default(),
        })
        .await
        .expect_err("rejected");
    assert!(matches!(err, Error::UserRejectedTransaction));
}

#[tokio::test]
async fn qr_relay_deactivation_closes_the_session() {
    let h = harness();
    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    h.runtime.connector.activate(None).await.expect("activate");

    h.runtime.connector.deactivate().await.expect("deactivate");
    assert!(h.wallet.is_closed().expect("closed"));
    assert!(h.runtime.connector.session().is_some_and(|s| !s.is_enabled));
}

#[tokio::test]
async fn permissions_come_back_from_the_wallet() {
    let h = harness();
    h.connect_extension().await;
    let permissions = h.runtime.connector.request_permissions().await;
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0]["parentCapability"], "eth_accounts");
}

#[tokio::test]
async fn deactivation_leaves_every_kind_not_connected() {
    for kind in WalletKind::ALL {
        let h = harness();
        h.runtime
            .connector
            .connect(kind, None)
            .await
            .expect("connect");
        h.runtime.connector.activate(None).await.expect("activate");
        assert!(h.runtime.connector.check_ready(ChainName::Ethereum).is_ok());

        h.runtime.connector.deactivate().await.expect("deactivate");
        assert!(
            matches!(
                h.runtime.connector.check_ready(ChainName::Ethereum),
                Err(Error::WalletNotConnected)
            ),
            "{kind} still ready after deactivation"
        );
    }
}

#[tokio::test]
async fn disabled_session_does_not_publish_wallet_events() {
    let h = harness();
    h.connect_extension().await;
    h.runtime.connector.deactivate().await.expect("deactivate");

    let mut addresses = h.runtime.connector.subscribe_address();
    let mut chains = h.runtime.connector.subscribe_chain();
    assert_eq!(addresses.try_next(), Some(None));
    assert_eq!(chains.try_next(), Some(None));

    h.wallet.inject_chain_changed(56).expect("event");
    h.wallet
        .inject_accounts_changed(vec![other_user()])
        .expect("event");
    assert_eq!(addresses.try_next(), None);
    assert_eq!(chains.try_next(), None);
    let session = h.runtime.connector.session().expect("session");
    assert!(!session.is_enabled);
    assert_eq!(session.chain, None);

    h.runtime.connector.activate(None).await.expect("activate");
    assert_eq!(addresses.try_next(), Some(Some(other_user())));
    let chain = chains.try_next().expect("chain published").expect("known chain");
    assert_eq!(chain.name, ChainName::BinanceSmartChain);
}

#[tokio::test]
async fn qr_relay_is_installed_only_while_the_relay_answers() {
    let wallet = DeterministicWallet::new(vec![user()], 1);
    let connector = qr_connector_for(&wallet, Duration::from_millis(20));
    let provider = connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    assert!(provider.is_installed().await);

    wallet.set_unresponsive(true).expect("script");
    assert!(!provider.is_installed().await);
    let err = connector.activate(None).await.expect_err("relay unreachable");
    assert!(matches!(err, Error::WalletNotInstalled(WalletKind::QrRelay)));
    assert!(connector.session().is_some_and(|s| !s.is_enabled));

    wallet.set_unresponsive(false).expect("script");
    assert!(provider.is_installed().await);
    connector.activate(None).await.expect("activate");
    assert!(connector.check_ready(ChainName::Ethereum).is_ok());
}

#[tokio::test]
async fn replacing_a_relay_wallet_closes_its_session() {
    let h = harness();
    h.runtime
        .connector
        .connect(WalletKind::RelayWallet, None)
        .await
        .expect("connect");
    h.runtime.connector.activate(None).await.expect("activate");
    assert!(!h.wallet.is_closed().expect("closed"));

    h.runtime
        .connector
        .connect(WalletKind::BrowserExtension, None)
        .await
        .expect("connect");
    assert!(h.wallet.is_closed().expect("closed"));
    assert_eq!(
        h.runtime.connector.session().map(|s| s.provider_kind),
        Some(WalletKind::BrowserExtension)
    );
}

#[tokio::test]
async fn reconnecting_the_same_kind_keeps_the_relay_session_open() {
    let h = harness();
    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("connect");
    h.runtime.connector.activate(None).await.expect("activate");

    h.runtime
        .connector
        .connect(WalletKind::QrRelay, None)
        .await
        .expect("reconnect");
    assert!(!h.wallet.is_closed().expect("closed"));
}
