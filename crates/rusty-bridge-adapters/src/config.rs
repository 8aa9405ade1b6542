use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use rusty_bridge_core::bridge::PollSettings;
use rusty_bridge_core::wallet::WalletTimeouts;
use rusty_bridge_core::ChainName;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub wallet_activation_timeout_ms: u64,
    pub wallet_request_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub receipt_poll_interval_ms: u64,
    pub status_poll_interval_ms: u64,
    pub max_poll_errors: u32,
    pub token_refresh_interval_ms: u64,
    pub relay_service_base_url: String,
    pub backend_base_url: String,
    pub checkpoint_base_url: String,
    pub session_store_path: Option<PathBuf>,
    /// JSON file with contract addresses, see `Deployments`.
    pub deployments_path: Option<PathBuf>,
    pub wallet_proxy_url: Option<String>,
    pub testing_mode: bool,
    pub rpc_overrides: BTreeMap<ChainName, String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            wallet_activation_timeout_ms: 120_000,
            wallet_request_timeout_ms: 60_000,
            http_timeout_ms: 15_000,
            receipt_poll_interval_ms: 3_000,
            status_poll_interval_ms: 10_000,
            max_poll_errors: 5,
            token_refresh_interval_ms: 5 * 60 * 1000,
            relay_service_base_url: "https://api.binance.org/bridge/api/v2".to_owned(),
            backend_base_url: "https://api.rubic.exchange/api".to_owned(),
            checkpoint_base_url: "https://proof-generator.polygon.technology/api/v1".to_owned(),
            session_store_path: None,
            deployments_path: None,
            wallet_proxy_url: None,
            testing_mode: false,
            rpc_overrides: BTreeMap::new(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env_string(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl AdapterConfig {
    /// Defaults overridden by `RUSTY_BRIDGE_*` variables.
    /// RPC endpoints use `RUSTY_BRIDGE_RPC_<CHAIN>`, e.g. `RUSTY_BRIDGE_RPC_BSC`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let rpc_overrides = ChainName::ALL
            .into_iter()
            .filter_map(|chain| {
                env_string(&format!("RUSTY_BRIDGE_RPC_{}", chain.as_str())).map(|url| (chain, url))
            })
            .collect();
        Self {
            wallet_activation_timeout_ms: env_parsed(
                "RUSTY_BRIDGE_WALLET_ACTIVATION_TIMEOUT_MS",
                d.wallet_activation_timeout_ms,
            ),
            wallet_request_timeout_ms: env_parsed(
                "RUSTY_BRIDGE_WALLET_REQUEST_TIMEOUT_MS",
                d.wallet_request_timeout_ms,
            ),
            http_timeout_ms: env_parsed("RUSTY_BRIDGE_HTTP_TIMEOUT_MS", d.http_timeout_ms),
            receipt_poll_interval_ms: env_parsed(
                "RUSTY_BRIDGE_RECEIPT_POLL_INTERVAL_MS",
                d.receipt_poll_interval_ms,
            ),
            status_poll_interval_ms: env_parsed(
                "RUSTY_BRIDGE_STATUS_POLL_INTERVAL_MS",
                d.status_poll_interval_ms,
            ),
            max_poll_errors: env_parsed("RUSTY_BRIDGE_MAX_POLL_ERRORS", d.max_poll_errors),
            token_refresh_interval_ms: env_parsed(
                "RUSTY_BRIDGE_TOKEN_REFRESH_INTERVAL_MS",
                d.token_refresh_interval_ms,
            ),
            relay_service_base_url: env_string("RUSTY_BRIDGE_RELAY_SERVICE_URL")
                .unwrap_or(d.relay_service_base_url),
            backend_base_url: env_string("RUSTY_BRIDGE_BACKEND_URL").unwrap_or(d.backend_base_url),
            checkpoint_base_url: env_string("RUSTY_BRIDGE_CHECKPOINT_URL")
                .unwrap_or(d.checkpoint_base_url),
            session_store_path: env_string("RUSTY_BRIDGE_SESSION_STORE").map(PathBuf::from),
            deployments_path: env_string("RUSTY_BRIDGE_DEPLOYMENTS").map(PathBuf::from),
            wallet_proxy_url: env_string("RUSTY_BRIDGE_WALLET_PROXY_URL"),
            testing_mode: env_flag("RUSTY_BRIDGE_TESTING_MODE"),
            rpc_overrides,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn wallet_timeouts(&self) -> WalletTimeouts {
        WalletTimeouts {
            activation: Duration::from_millis(self.wallet_activation_timeout_ms),
            request: Duration::from_millis(self.wallet_request_timeout_ms),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            receipt_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            status_interval: Duration::from_millis(self.status_poll_interval_ms),
            max_poll_errors: self.max_poll_errors,
            token_refresh_interval: Duration::from_millis(self.token_refresh_interval_ms),
        }
    }
}
