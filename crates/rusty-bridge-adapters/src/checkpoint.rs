//! Polygon proof generator: checkpoint inclusion of burn blocks and the exit
//! payload the root chain manager takes.

use std::time::Duration;

use alloy::primitives::{Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rusty_bridge_core::{ChainName, CheckpointPort, PortError};

use crate::rest::RestClient;

/// `Transfer(address,address,uint256)`, the event a child token emits on burn.
pub const BURN_EVENT_SIGNATURE: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Debug, Deserialize)]
struct InclusionResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PayloadResponse {
    result: Bytes,
}

#[derive(Debug, Clone)]
pub struct ProofGeneratorApi {
    rest: RestClient,
}

impl ProofGeneratorApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PortError> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }
}

/// Path segment the proof generator serves `network` under.
pub fn network_path(network: ChainName) -> Result<&'static str, PortError> {
    match network {
        ChainName::Polygon => Ok("matic"),
        ChainName::PolygonTestnet => Ok("mumbai"),
        other => Err(PortError::Validation(format!(
            "no checkpoints are published for {other}"
        ))),
    }
}

#[async_trait]
impl CheckpointPort for ProofGeneratorApi {
    async fn is_checkpointed(&self, network: ChainName, block: u64) -> Result<bool, PortError> {
        let path = format!("{}/block-included/{block}", network_path(network)?);
        match self.rest.get::<InclusionResponse>(&path, &[]).await {
            Ok(response) => Ok(response.message.eq_ignore_ascii_case("success")),
            Err(PortError::NotFound(_)) => {
                debug!(%network, block, "block not checkpointed yet");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn exit_payload(&self, network: ChainName, burn_tx: B256) -> Result<Bytes, PortError> {
        let path = format!("{}/exit-payload/{burn_tx}", network_path(network)?);
        let response: PayloadResponse = self
            .rest
            .get(&path, &[("eventSignature", BURN_EVENT_SIGNATURE)])
            .await?;
        if response.result.is_empty() {
            return Err(PortError::Validation(format!(
                "empty exit payload for {burn_tx}"
            )));
        }
        Ok(response.result)
    }
}
