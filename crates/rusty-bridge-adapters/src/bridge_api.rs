//! Product backend: lock/mint token catalog, bridge history and order-book trades.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};

use rusty_bridge_core::bridge::BridgeTransaction;
use rusty_bridge_core::domain::OrderRecord;
use rusty_bridge_core::{
    BridgeHistoryEntry, BridgeHistoryPort, BridgeToken, ChainName, OrderBookApiPort, PortError,
    TokenCatalogPort,
};

use crate::rest::RestClient;

#[derive(Debug, Clone)]
pub struct BackendApi {
    rest: RestClient,
}

impl BackendApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl TokenCatalogPort for BackendApi {
    async fn bridge_tokens(
        &self,
        from: ChainName,
        to: ChainName,
    ) -> Result<Vec<BridgeToken>, PortError> {
        self.rest
            .get(
                "bridges/tokens",
                &[("fromNetwork", from.as_str()), ("toNetwork", to.as_str())],
            )
            .await
    }
}

#[async_trait]
impl BridgeHistoryPort for BackendApi {
    async fn record(&self, transaction: &BridgeTransaction) -> Result<(), PortError> {
        let body = json!({
            "fromNetwork": transaction.source_chain,
            "toNetwork": transaction.destination_chain,
            "symbol": transaction.token,
            "amount": transaction.amount.to_string(),
            "walletFromAddress": transaction.source_address.to_checksum(None),
            "walletToAddress": transaction.destination_address,
            "transactionHash": transaction.source_tx_hash.map(|h| h.to_string()),
            "memo": transaction.memo,
            "status": transaction.state,
        });
        let _: Value = self.rest.post("bridges/transactions", &body).await?;
        Ok(())
    }

    async fn transactions(&self, user: Address) -> Result<Vec<BridgeHistoryEntry>, PortError> {
        let wallet = user.to_checksum(None);
        self.rest
            .get("bridges/transactions", &[("walletAddress", wallet.as_str())])
            .await
    }
}

#[async_trait]
impl OrderBookApiPort for BackendApi {
    async fn create_trade(&self, record: &OrderRecord) -> Result<(), PortError> {
        let _: Value = self.rest.post("trades/", record).await?;
        Ok(())
    }

    async fn trade(&self, unique_link: &str) -> Result<OrderRecord, PortError> {
        self.rest.get(&format!("trades/{unique_link}"), &[]).await
    }
}
