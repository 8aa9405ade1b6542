mod common;

use common::*;
use futures::StreamExt;
use rusty_bridge_core::bridge::no_progress;
use rusty_bridge_core::domain::RelaySwapStatus;
use rusty_bridge_core::{BridgeRequest, BridgeToken, ChainName, Error, PortError, TxState};

async fn relay_token(h: &Harness) -> BridgeToken {
    let provider = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists");
    let tokens = provider
        .tokens()
        .next()
        .await
        .expect("stream yields")
        .expect("tokens load");
    tokens
        .into_iter()
        .find(|t| t.symbol == "USDT")
        .expect("usdt listed")
}

fn request(token: BridgeToken, amount: &str) -> BridgeRequest {
    BridgeRequest {
        from: ChainName::Ethereum,
        to: ChainName::BinanceSmartChain,
        token,
        amount: amount.to_owned(),
        destination_address: other_user().to_checksum(None),
    }
}

fn funded() -> Harness {
    let h = harness();
    h.eth
        .answer_u256(usdt_eth(), "balanceOf(address)", units(1_000, 6));
    h
}

#[tokio::test]
async fn relay_tokens_map_networks_to_representations() {
    let h = harness();
    let token = relay_token(&h).await;

    let eth = token
        .representation(ChainName::Ethereum)
        .expect("eth side");
    assert_eq!(eth.address, usdt_eth().to_checksum(None));
    assert_eq!(eth.decimals, 6);
    assert_eq!(eth.min_amount.as_deref(), Some("10"));
    assert!(token.representation(ChainName::BinanceSmartChain).is_ok());
}

#[tokio::test]
async fn tron_route_lists_nothing_without_a_tron_network() {
    let h = harness();
    let provider = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::Tron)
        .expect("route exists");
    let tokens = provider
        .tokens()
        .next()
        .await
        .expect("stream yields")
        .expect("tokens load");
    assert!(tokens.is_empty());
}

#[tokio::test]
async fn relay_fee_is_quoted_in_the_bridged_token() {
    let h = harness();
    let token = relay_token(&h).await;
    let fee = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists")
        .quote_fee(&token, ChainName::BinanceSmartChain)
        .await
        .expect("fee");
    assert_eq!(fee.to_string(), "1.5 USDT");
}

#[tokio::test]
async fn deposit_goes_to_the_relay_address_and_completes_with_the_payout_hash() {
    let h = funded();
    h.connect_extension().await;
    h.relay.set_statuses(vec![
        RelaySwapStatus::Pending,
        RelaySwapStatus::Pending,
        RelaySwapStatus::Completed {
            destination_tx: Some("0xpayout".to_owned()),
        },
    ]);
    let token = relay_token(&h).await;

    let tx = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists")
        .create_transaction(request(token, "100"), no_progress())
        .await
        .expect("relay transfer completes");

    assert_eq!(tx.state, TxState::DestinationConfirmed);
    assert_eq!(tx.memo.as_deref(), Some("swap-1"));
    assert_eq!(
        tx.deposit_address.as_deref(),
        Some(relay_deposit().to_checksum(None).as_str())
    );
    assert_eq!(tx.destination_tx_hash.as_deref(), Some("0xpayout"));

    let swaps = h.relay.swaps();
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].amount, "100");
    assert_eq!(swaps[0].from_network, ChainName::Ethereum);
    assert_eq!(swaps[0].to_network, ChainName::BinanceSmartChain);
    assert_eq!(swaps[0].destination_address, other_user().to_checksum(None));
    assert_eq!(swaps[0].refund_address, user().to_checksum(None));

    let sent = h.wallet.sent_transactions().expect("sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["to"], usdt_eth().to_checksum(None));
    assert_eq!(h.backend.recorded().len(), 1);
}

#[tokio::test]
async fn amount_below_the_relay_minimum_is_rejected() {
    let h = funded();
    h.connect_extension().await;
    let token = relay_token(&h).await;

    let err = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists")
        .create_transaction(request(token, "5"), no_progress())
        .await
        .expect_err("below minimum");

    match err {
        Error::AmountOutOfRange { amount, min, .. } => {
            assert_eq!(amount, "5");
            assert_eq!(min, "10");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.relay.swaps().is_empty());
}

#[tokio::test]
async fn cancelled_swap_ends_in_cancelled() {
    let h = funded();
    h.connect_extension().await;
    h.relay.set_statuses(vec![RelaySwapStatus::Cancelled]);
    let token = relay_token(&h).await;

    let tx = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists")
        .create_transaction(request(token, "100"), no_progress())
        .await
        .expect("terminal");
    assert_eq!(tx.state, TxState::Cancelled);
}

#[tokio::test]
async fn failed_swap_can_be_resumed_without_opening_a_second_swap() {
    let h = funded();
    h.connect_extension().await;
    h.relay
        .set_statuses(vec![RelaySwapStatus::Failed("WithdrawFailed".to_owned())]);
    let token = relay_token(&h).await;
    let provider = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists");

    let err = provider
        .create_transaction(request(token, "100"), no_progress())
        .await
        .expect_err("relay reported failure");
    assert!(matches!(
        err.cause(),
        Error::Provider {
            source: PortError::Policy(_),
            ..
        }
    ));
    let failed = err.transaction().expect("failed transaction").clone();
    assert_eq!(failed.failed_at, Some(TxState::AwaitingRelay));
    assert_eq!(failed.memo.as_deref(), Some("swap-1"));

    h.relay.set_statuses(vec![RelaySwapStatus::Completed {
        destination_tx: None,
    }]);
    let resumed = provider
        .resume_transaction(failed, no_progress())
        .await
        .expect("resume completes");

    assert_eq!(resumed.state, TxState::DestinationConfirmed);
    assert_eq!(h.relay.swaps().len(), 1);
    assert_eq!(h.wallet.sent_transactions().expect("sent").len(), 1);
}

#[tokio::test]
async fn terminal_transaction_resumes_as_is() {
    let h = funded();
    h.connect_extension().await;
    let token = relay_token(&h).await;
    let provider = h
        .runtime
        .registry
        .require(ChainName::Ethereum, ChainName::BinanceSmartChain)
        .expect("route exists");

    let done = provider
        .create_transaction(request(token, "100"), no_progress())
        .await
        .expect("completes");
    let again = provider
        .resume_transaction(done.clone(), no_progress())
        .await
        .expect("nothing to do");
    assert_eq!(again, done);
    assert_eq!(h.relay.swaps().len(), 1);
}
