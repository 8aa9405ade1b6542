use std::collections::BTreeMap;

use alloy::primitives::U256;
use rusty_bridge_core::domain::{find_token, OrderRecord};
use rusty_bridge_core::{
    BridgeHistoryEntry, BridgeToken, ChainName, Error, Fee, TokenAmount, TokenRepresentation,
    TxState, WalletKind,
};

#[test]
fn wallet_kinds_persist_under_their_storage_names() {
    for (kind, stored) in [
        (WalletKind::BrowserExtension, "METAMASK"),
        (WalletKind::RelayWallet, "WALLET_LINK"),
        (WalletKind::QrRelay, "WALLET_CONNECT"),
    ] {
        let json = serde_json::to_string(&kind).expect("serialize kind");
        assert_eq!(json, format!("\"{stored}\""));
        assert_eq!(stored.parse::<WalletKind>().expect("parse kind"), kind);
    }
    assert!("TREZOR".parse::<WalletKind>().is_err());
    assert!(WalletKind::BrowserExtension.can_switch_network());
    assert!(!WalletKind::QrRelay.can_switch_network());
}

#[test]
fn chain_names_and_states_use_screaming_snake_case() {
    let json = serde_json::to_string(&ChainName::BinanceSmartChain).expect("serialize chain");
    assert_eq!(json, "\"BINANCE_SMART_CHAIN\"");
    let state = serde_json::to_string(&TxState::DestinationConfirmed).expect("serialize state");
    assert_eq!(state, "\"DESTINATION_CONFIRMED\"");
    let back: TxState = serde_json::from_str("\"AWAITING_RELAY\"").expect("deserialize state");
    assert_eq!(back, TxState::AwaitingRelay);
}

#[test]
fn token_amounts_parse_and_format_without_trailing_zeros() {
    let amount = TokenAmount::parse("1.50", 6).expect("parse");
    assert_eq!(amount.raw, U256::from(1_500_000u64));
    assert_eq!(amount.to_string(), "1.5");

    let whole = TokenAmount::parse("100", 18).expect("parse");
    assert_eq!(whole.to_string(), "100");
    assert!(TokenAmount::new(U256::ZERO, 6).is_zero());

    assert!(matches!(
        TokenAmount::parse("-1", 6),
        Err(Error::InvalidAmount(_))
    ));
    assert!(matches!(TokenAmount::parse("", 6), Err(Error::InvalidAmount(_))));
    assert!(matches!(
        TokenAmount::parse("ten", 6),
        Err(Error::InvalidAmount(_))
    ));
}

#[test]
fn fee_displays_amount_and_symbol() {
    let fee = Fee {
        amount: TokenAmount::parse("0.5", 18).expect("parse"),
        symbol: "MATIC".to_owned(),
    };
    assert_eq!(fee.to_string(), "0.5 MATIC");
}

fn usdt(min: Option<&str>, max: Option<&str>) -> TokenRepresentation {
    TokenRepresentation {
        address: "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_owned(),
        symbol: "USDT".to_owned(),
        name: "Tether USD".to_owned(),
        decimals: 6,
        min_amount: min.map(str::to_owned),
        max_amount: max.map(str::to_owned),
    }
}

#[test]
fn checked_amount_enforces_representation_limits() {
    let token = usdt(Some("10"), Some("10000"));
    assert_eq!(
        token.checked_amount("25").expect("in range").raw,
        U256::from(25_000_000u64)
    );

    match token.checked_amount("20000") {
        Err(Error::AmountOutOfRange { amount, max, .. }) => {
            assert_eq!(amount, "20000");
            assert_eq!(max, "10000");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        token.checked_amount("0"),
        Err(Error::InvalidAmount(_))
    ));

    let open = usdt(None, None);
    assert!(open.checked_amount("0.000001").is_ok());
    assert!(!open.is_native());
}

#[test]
fn order_record_uses_backend_field_names() {
    let record: OrderRecord = serde_json::from_value(serde_json::json!({
        "memo_contract": "0x42",
        "contract_address": "0x00000000000000000000000000000000000000B1",
        "base_address": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        "quote_address": "0x0000000000000000000000000000000000000000",
        "base_limit": "1000000000",
        "quote_limit": "500000000000000000",
        "stop_date": 1739836800000u64,
        "public": true,
        "min_base_wei": "0",
        "min_quote_wei": "0",
        "broker_fee": false,
        "broker_fee_address": "0x0000000000000000000000000000000000000000",
        "broker_fee_base": 0,
        "broker_fee_quote": 0,
        "name": "USDT <> ETH",
        "network": 1,
        "state": "ACTIVE",
    }))
    .expect("deserialize record");
    assert!(record.is_public);
    assert_eq!(record.unique_link, None);

    let json = serde_json::to_value(&record).expect("serialize record");
    assert_eq!(json["public"], true);
    assert!(json.get("is_public").is_none());
}

#[test]
fn find_token_matches_symbols_case_insensitively() {
    let token = |symbol: &str| BridgeToken {
        symbol: symbol.to_owned(),
        name: symbol.to_owned(),
        image: String::new(),
        rank: 1,
        representations: BTreeMap::new(),
    };
    let tokens = vec![token("USDT"), token("RBC")];

    assert_eq!(find_token(&tokens, "rbc").expect("found").symbol, "RBC");
    let err = find_token(&tokens, "DAI").expect_err("not listed");
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn history_entries_accept_blockchain_field_names() {
    let entry: BridgeHistoryEntry = serde_json::from_value(serde_json::json!({
        "fromBlockchain": "POLYGON",
        "toBlockchain": "ETHEREUM",
        "fromSymbol": "0xc2132D05D31c914a87C6611C10748AEb04B58e8F",
        "toSymbol": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        "status": "DEPOSIT_IN_PROGRESS",
    }))
    .expect("entry");
    assert_eq!(entry.from_network, ChainName::Polygon);
    assert_eq!(entry.to_network, ChainName::Ethereum);
    assert!(entry.amount.is_empty());
    assert_eq!(entry.transaction_hash, None);
}
