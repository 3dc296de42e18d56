//! Static network configuration.

use std::{fs, path::Path};

use alloy::primitives::U256;
use error_stack::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    core::{decimal, Address, ChainId},
    error::LedgerError,
};

/// One chain to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSource {
    /// Network name, also the name of its data directory.
    pub name: String,
    pub chain_id: ChainId,
    /// RPC endpoints, used in round-robin order when rate limited.
    pub rpcs: Vec<Url>,
    /// First block to scan when no progress has been persisted.
    #[serde(with = "decimal")]
    pub from_block: U256,
    /// Only fetch logs emitted by this contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl NetworkSource {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.is_empty()
            || self
                .name
                .contains(|c: char| c == '/' || c == '\\' || c == '.')
        {
            return Err(LedgerError::Configuration)
                .attach_printable("network name must be a plain directory name")
                .attach_printable_lazy(|| format!("name: {:?}", self.name));
        }

        if self.rpcs.is_empty() {
            return Err(LedgerError::Configuration)
                .attach_printable("network has no rpc endpoints")
                .attach_printable_lazy(|| format!("network: {}", self.name));
        }

        Ok(())
    }
}

/// Load and validate the network list from a json file.
pub fn load_networks(path: impl AsRef<Path>) -> Result<Vec<NetworkSource>, LedgerError> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .change_context(LedgerError::Configuration)
        .attach_printable("failed to read networks file")
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;

    parse_networks(&content).attach_printable_lazy(|| format!("path: {}", path.display()))
}

pub fn parse_networks(content: &str) -> Result<Vec<NetworkSource>, LedgerError> {
    let networks: Vec<NetworkSource> = serde_json::from_str(content)
        .change_context(LedgerError::Configuration)
        .attach_printable("failed to parse networks file")?;

    for network in &networks {
        network.validate()?;
    }

    for (i, network) in networks.iter().enumerate() {
        if networks[..i].iter().any(|other| other.name == network.name) {
            return Err(LedgerError::Configuration)
                .attach_printable("duplicate network name")
                .attach_printable_lazy(|| format!("name: {}", network.name));
        }
    }

    Ok(networks)
}
