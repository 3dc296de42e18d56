use std::{path::PathBuf, time::Duration};

use clap::Args;
use error_stack::{Result, ResultExt};

use crate::{
    config::{load_networks, NetworkSource},
    error::LedgerError,
    ingestion::RetryOptions,
    provider::{JsonRpcProviderFactory, JsonRpcProviderOptions},
};

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding the per-network partitions and progress files.
    #[arg(long = "data-dir", env = "LEDGER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct NetworksArgs {
    /// Path to the json file listing the networks to index.
    #[arg(long = "networks", env = "LEDGER_NETWORKS")]
    pub networks_file: PathBuf,

    /// Only index the named network. Can be repeated.
    #[arg(long = "network")]
    pub only: Vec<String>,
}

impl NetworksArgs {
    pub fn load(&self) -> Result<Vec<NetworkSource>, LedgerError> {
        let networks = load_networks(&self.networks_file)?;

        if self.only.is_empty() {
            return Ok(networks);
        }

        if let Some(unknown) = self
            .only
            .iter()
            .find(|name| !networks.iter().any(|network| network.name == **name))
        {
            return Err(LedgerError::Configuration)
                .attach_printable("unknown network")
                .attach_printable_lazy(|| format!("network: {unknown}"))
                .attach_printable_lazy(|| format!("file: {:?}", self.networks_file));
        }

        Ok(networks
            .into_iter()
            .filter(|network| self.only.contains(&network.name))
            .collect())
    }
}

#[derive(Args, Debug, Clone)]
pub struct RpcArgs {
    /// Attempts per request when rate limited, including the first one.
    #[arg(
        long = "rpc.max-attempts",
        env = "LEDGER_RPC_MAX_ATTEMPTS",
        default_value = "5"
    )]
    pub rpc_max_attempts: u32,

    /// Delay before the first retry. Doubles after every attempt.
    #[arg(
        long = "rpc.initial-backoff-ms",
        env = "LEDGER_RPC_INITIAL_BACKOFF_MS",
        default_value = "1000"
    )]
    pub rpc_initial_backoff_ms: u64,

    /// Upper bound of the delay between two attempts.
    #[arg(
        long = "rpc.max-backoff-sec",
        env = "LEDGER_RPC_MAX_BACKOFF_SEC",
        default_value = "60"
    )]
    pub rpc_max_backoff_sec: u64,

    /// Request timeout.
    #[arg(
        long = "rpc.timeout-sec",
        env = "LEDGER_RPC_TIMEOUT_SEC",
        default_value = "30"
    )]
    pub rpc_timeout_sec: u64,
}

impl RpcArgs {
    pub fn to_retry_options(&self) -> Result<RetryOptions, LedgerError> {
        if self.rpc_max_attempts == 0 {
            return Err(LedgerError::Configuration)
                .attach_printable("rpc.max-attempts must be at least 1");
        }

        Ok(RetryOptions {
            max_attempts: self.rpc_max_attempts,
            initial_delay: Duration::from_millis(self.rpc_initial_backoff_ms),
            max_delay: Duration::from_secs(self.rpc_max_backoff_sec),
        })
    }

    pub fn to_provider_factory(&self) -> JsonRpcProviderFactory {
        JsonRpcProviderFactory::new(JsonRpcProviderOptions {
            timeout: Duration::from_secs(self.rpc_timeout_sec),
        })
    }
}
