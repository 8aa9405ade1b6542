//! A wallet's past bridge transfers, with Polygon token addresses shown as symbols.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;
use tracing::debug;

use crate::chain::ChainName;
use crate::domain::{BridgeHistoryEntry, BridgeToken};
use crate::error::Error;
use crate::ports::{BridgeHistoryPort, TokenCatalogPort};

pub struct BridgeHistory {
    history: Arc<dyn BridgeHistoryPort>,
    catalog: Arc<dyn TokenCatalogPort>,
}

impl BridgeHistory {
    pub fn new(history: Arc<dyn BridgeHistoryPort>, catalog: Arc<dyn TokenCatalogPort>) -> Self {
        Self { history, catalog }
    }

    pub async fn transactions(&self, user: Address) -> Result<Vec<BridgeHistoryEntry>, Error> {
        let mut entries = self
            .history
            .transactions(user)
            .await
            .map_err(|e| Error::network(format!("loading bridge history of {user}"), e))?;

        let mut catalogs: BTreeMap<(ChainName, ChainName), Vec<BridgeToken>> = BTreeMap::new();
        for entry in entries.iter_mut().filter(|e| reports_addresses(e)) {
            let pair @ (from, to) = (entry.from_network, entry.to_network);
            if !catalogs.contains_key(&pair) {
                let tokens = self
                    .catalog
                    .bridge_tokens(from, to)
                    .await
                    .map_err(|e| Error::network(format!("loading {from}->{to} tokens"), e))?;
                catalogs.insert(pair, tokens);
            }
            let tokens = catalogs.get(&pair).map(Vec::as_slice).unwrap_or_default();
            resolve_symbol(&mut entry.from_symbol, tokens, entry.from_network);
            resolve_symbol(&mut entry.to_symbol, tokens, entry.to_network);
        }
        Ok(entries)
    }
}

fn reports_addresses(entry: &BridgeHistoryEntry) -> bool {
    [entry.from_network, entry.to_network]
        .iter()
        .any(|n| matches!(n, ChainName::Polygon | ChainName::PolygonTestnet))
}

/// Replaces a token address with the symbol of the token it belongs to on
/// `chain`; unknown addresses are left as they are.
fn resolve_symbol(symbol: &mut String, tokens: &[BridgeToken], chain: ChainName) {
    let found = tokens.iter().find_map(|token| {
        token
            .representations
            .get(&chain)
            .filter(|r| r.address.eq_ignore_ascii_case(symbol))
            .map(|r| r.symbol.clone())
    });
    match found {
        Some(resolved) => *symbol = resolved,
        None => debug!(%chain, address = %symbol, "history token not in catalog"),
    }
}
