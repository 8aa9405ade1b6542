//! Wallet handles: the objects a provider talks EIP-1193 to.
//!
//! `DeterministicWallet` answers in process and lets callers inject the events a
//! real wallet would push. `HttpWalletHandle` forwards every request as JSON-RPC
//! to a signer proxy.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{keccak256, Address};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use rusty_bridge_core::ports::{UNRECOGNIZED_CHAIN_ERROR_CODE, USER_REJECT_ERROR_CODE};
use rusty_bridge_core::wallet::parse_chain_value;
use rusty_bridge_core::{PortError, WalletEvent, WalletEventSink, WalletHandle};

const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Default)]
struct DeterministicState {
    available: bool,
    unresponsive: bool,
    authorized: bool,
    accounts: Vec<Address>,
    chain_id: u64,
    known_chains: Vec<u64>,
    reject_next: Option<(i64, String)>,
    sink: Option<WalletEventSink>,
    sent: Vec<Value>,
    watched: Vec<Value>,
    requests: Vec<String>,
    closed: bool,
}

/// In-process wallet with scripted accounts and chain.
#[derive(Clone)]
pub struct DeterministicWallet {
    state: Arc<Mutex<DeterministicState>>,
}

impl DeterministicWallet {
    pub fn new(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeterministicState {
                available: true,
                accounts,
                chain_id,
                known_chains: vec![chain_id],
                ..DeterministicState::default()
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DeterministicState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))
    }

    /// Treats the session as already authorized, as after a page reload.
    pub fn with_authorized(self) -> Self {
        if let Ok(mut g) = self.lock() {
            g.authorized = true;
        }
        self
    }

    /// Chains the wallet can switch to without `wallet_addEthereumChain`.
    pub fn with_known_chains(self, chains: &[u64]) -> Self {
        if let Ok(mut g) = self.lock() {
            for id in chains {
                if !g.known_chains.contains(id) {
                    g.known_chains.push(*id);
                }
            }
        }
        self
    }

    pub fn set_available(&self, available: bool) -> Result<(), PortError> {
        self.lock()?.available = available;
        Ok(())
    }

    /// Every later request hangs until the caller's timeout fires.
    pub fn set_unresponsive(&self, unresponsive: bool) -> Result<(), PortError> {
        self.lock()?.unresponsive = unresponsive;
        Ok(())
    }

    /// Fails the next request with the given EIP-1193 error.
    pub fn reject_next(&self, code: i64, message: &str) -> Result<(), PortError> {
        self.lock()?.reject_next = Some((code, message.to_owned()));
        Ok(())
    }

    pub fn reject_next_by_user(&self) -> Result<(), PortError> {
        self.reject_next(USER_REJECT_ERROR_CODE, "User rejected the request.")
    }

    pub fn sent_transactions(&self) -> Result<Vec<Value>, PortError> {
        Ok(self.lock()?.sent.clone())
    }

    pub fn watched_assets(&self) -> Result<Vec<Value>, PortError> {
        Ok(self.lock()?.watched.clone())
    }

    pub fn requested_methods(&self) -> Result<Vec<String>, PortError> {
        Ok(self.lock()?.requests.clone())
    }

    pub fn chain_id(&self) -> Result<u64, PortError> {
        Ok(self.lock()?.chain_id)
    }

    pub fn is_closed(&self) -> Result<bool, PortError> {
        Ok(self.lock()?.closed)
    }

    fn emit(&self, event: WalletEvent) -> Result<(), PortError> {
        // The sink runs without the lock held; it may call back into the wallet.
        let sink = self.lock()?.sink.clone();
        if let Some(sink) = sink {
            sink(event);
        }
        Ok(())
    }

    pub fn inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.lock()?.accounts = accounts.clone();
        self.emit(WalletEvent::AccountsChanged(accounts))
    }

    pub fn inject_chain_changed(&self, chain_id: u64) -> Result<(), PortError> {
        self.lock()?.chain_id = chain_id;
        self.emit(WalletEvent::ChainChanged(chain_id))
    }

    pub fn inject_disconnect(&self) -> Result<(), PortError> {
        self.lock()?.authorized = false;
        self.emit(WalletEvent::Disconnect)
    }

    fn target_chain(params: &Value) -> Result<u64, PortError> {
        let raw = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .ok_or_else(|| PortError::Validation("missing chainId".to_owned()))?;
        parse_chain_value(raw)
    }

    fn answer(
        &self,
        method: &str,
        params: &Value,
    ) -> Result<(Value, Option<WalletEvent>), PortError> {
        let mut g = self.lock()?;
        g.requests.push(method.to_owned());
        if let Some((code, message)) = g.reject_next.take() {
            return Err(PortError::Rpc { code, message });
        }
        let accounts = |g: &DeterministicState| {
            json!(g
                .accounts
                .iter()
                .map(|a| a.to_checksum(None))
                .collect::<Vec<_>>())
        };
        match method {
            "eth_requestAccounts" => {
                g.authorized = true;
                g.closed = false;
                Ok((accounts(&g), None))
            }
            "eth_accounts" if g.authorized => Ok((accounts(&g), None)),
            "eth_accounts" => Ok((json!([]), None)),
            "eth_chainId" => Ok((json!(format!("{:#x}", g.chain_id)), None)),
            "wallet_requestPermissions" => {
                Ok((json!([{ "parentCapability": "eth_accounts" }]), None))
            }
            "wallet_switchEthereumChain" => {
                let id = Self::target_chain(params)?;
                if !g.known_chains.contains(&id) {
                    return Err(PortError::Rpc {
                        code: UNRECOGNIZED_CHAIN_ERROR_CODE,
                        message: format!("Unrecognized chain ID {id:#x}"),
                    });
                }
                g.chain_id = id;
                Ok((Value::Null, Some(WalletEvent::ChainChanged(id))))
            }
            "wallet_addEthereumChain" => {
                let id = Self::target_chain(params)?;
                if !g.known_chains.contains(&id) {
                    g.known_chains.push(id);
                }
                g.chain_id = id;
                Ok((Value::Null, Some(WalletEvent::ChainChanged(id))))
            }
            "wallet_watchAsset" => {
                g.watched.push(params.clone());
                Ok((json!(true), None))
            }
            "eth_sendTransaction" => {
                let payload = params.get(0).cloned().unwrap_or(Value::Null);
                let mut preimage = payload.to_string().into_bytes();
                preimage.extend_from_slice(&(g.sent.len() as u64).to_be_bytes());
                g.sent.push(payload);
                Ok((json!(keccak256(&preimage).to_string()), None))
            }
            _ => Err(PortError::Rpc {
                code: METHOD_NOT_FOUND,
                message: format!("method not supported: {method}"),
            }),
        }
    }
}

#[async_trait]
impl WalletHandle for DeterministicWallet {
    fn is_available(&self) -> bool {
        self.lock().map(|g| g.available).unwrap_or(false)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let (available, unresponsive) = {
            let g = self.lock()?;
            (g.available, g.unresponsive)
        };
        if !available {
            return Err(PortError::Policy("wallet unavailable".to_owned()));
        }
        if unresponsive {
            std::future::pending::<()>().await;
        }
        let (result, event) = self.answer(method, &params)?;
        debug!(method, "deterministic wallet answered");
        if let Some(event) = event {
            self.emit(event)?;
        }
        Ok(result)
    }

    fn listen(&self, sink: WalletEventSink) -> Result<(), PortError> {
        self.lock()?.sink = Some(sink);
        Ok(())
    }

    async fn close(&self) -> Result<(), PortError> {
        let mut g = self.lock()?;
        g.closed = true;
        g.authorized = false;
        Ok(())
    }
}

/// Forwards EIP-1193 requests to a JSON-RPC signer proxy.
#[derive(Debug, Clone)]
pub struct HttpWalletHandle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWalletHandle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("wallet proxy client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl WalletHandle for HttpWalletHandle {
    fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.base_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("wallet proxy request failed: {e}")))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("wallet proxy json decode failed: {e}")))?;
        if !status.is_success() {
            return Err(PortError::Transport(format!(
                "wallet proxy status {status}: {body}"
            )));
        }
        if let Some(err) = body.get("error") {
            return Err(rpc_error(err));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| PortError::Transport("wallet proxy missing result".to_owned()))
    }

    fn listen(&self, _sink: WalletEventSink) -> Result<(), PortError> {
        Err(PortError::NotImplemented("wallet proxy does not push events"))
    }
}

/// JSON-RPC error object to `PortError::Rpc`.
pub fn rpc_error(err: &Value) -> PortError {
    let code = err.get("code").and_then(Value::as_i64);
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    match code {
        Some(code) => PortError::Rpc { code, message },
        None => PortError::Transport(format!("rpc returned error: {err}")),
    }
}
