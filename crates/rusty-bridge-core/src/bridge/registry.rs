use std::sync::Arc;

use tracing::debug;

use super::{BridgeProvider, BridgeProviderKind};
use crate::chain::ChainName;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRoute {
    pub from: ChainName,
    pub to: ChainName,
    pub kind: BridgeProviderKind,
}

impl BridgeRoute {
    pub const fn new(from: ChainName, to: ChainName, kind: BridgeProviderKind) -> Self {
        Self { from, to, kind }
    }
}

/// Routes the product ships with, in the order suggestions are made.
pub fn default_routes() -> Vec<BridgeRoute> {
    use BridgeProviderKind::{LockMint, RelayNetwork};
    use ChainName::*;

    vec![
        BridgeRoute::new(Ethereum, BinanceSmartChain, RelayNetwork),
        BridgeRoute::new(BinanceSmartChain, Ethereum, RelayNetwork),
        BridgeRoute::new(Ethereum, Tron, RelayNetwork),
        BridgeRoute::new(BinanceSmartChain, Tron, RelayNetwork),
        BridgeRoute::new(Ethereum, Polygon, LockMint),
        BridgeRoute::new(Polygon, Ethereum, LockMint),
        BridgeRoute::new(BinanceSmartChain, Polygon, LockMint),
        BridgeRoute::new(Ethereum, Xdai, LockMint),
    ]
}

pub enum PairLookup {
    Supported(Arc<dyn BridgeProvider>),
    Unsupported {
        suggested: Option<(ChainName, ChainName)>,
    },
}

impl std::fmt::Debug for PairLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairLookup::Supported(provider) => {
                f.debug_tuple("Supported").field(&provider.kind()).finish()
            }
            PairLookup::Unsupported { suggested } => f
                .debug_struct("Unsupported")
                .field("suggested", suggested)
                .finish(),
        }
    }
}

/// (source, destination) matrix built once at startup.
pub struct BridgeRegistry {
    entries: Vec<(BridgeRoute, Arc<dyn BridgeProvider>)>,
}

impl BridgeRegistry {
    /// Constructs a provider per route through `dispatch`; fails if a provider
    /// does not support the pair it was built for.
    pub fn build<F>(routes: Vec<BridgeRoute>, dispatch: F) -> Result<Self, Error>
    where
        F: Fn(&BridgeRoute) -> Result<Arc<dyn BridgeProvider>, Error>,
    {
        let mut entries = Vec::with_capacity(routes.len());
        for route in routes {
            let provider = dispatch(&route)?;
            if provider.kind() != route.kind || !provider.supports(route.from, route.to) {
                return Err(Error::BridgePairUnsupported {
                    from: route.from,
                    to: route.to,
                    suggested: None,
                });
            }
            debug!(
                from = %route.from,
                to = %route.to,
                kind = %route.kind,
                "bridge route registered"
            );
            entries.push((route, provider));
        }
        Ok(Self { entries })
    }

    pub fn routes(&self) -> impl Iterator<Item = &BridgeRoute> {
        self.entries.iter().map(|(route, _)| route)
    }

    pub fn lookup(&self, from: ChainName, to: ChainName) -> PairLookup {
        if let Some((_, provider)) = self
            .entries
            .iter()
            .find(|(route, _)| route.from == from && route.to == to)
        {
            return PairLookup::Supported(Arc::clone(provider));
        }
        let suggested = self
            .routes()
            .find(|route| route.from == from)
            .or_else(|| self.routes().next())
            .map(|route| (route.from, route.to));
        PairLookup::Unsupported { suggested }
    }

    pub fn require(
        &self,
        from: ChainName,
        to: ChainName,
    ) -> Result<Arc<dyn BridgeProvider>, Error> {
        match self.lookup(from, to) {
            PairLookup::Supported(provider) => Ok(provider),
            PairLookup::Unsupported { suggested } => {
                Err(Error::BridgePairUnsupported { from, to, suggested })
            }
        }
    }
}
