//! Boundary with the chain RPC.
//!
//! The rest of the crate only sees [LogProvider] and [DecodedLog]. Failures are
//! classified into [ProviderError] as soon as the transport reports them, so
//! the fetcher can tell a rate limit apart from any other failure.
mod abi;
mod http;

use std::collections::BTreeMap;

use alloy::primitives::{ruint::UintTryFrom, U256};
use async_trait::async_trait;
use error_stack::{Report, Result};
use url::Url;

use crate::core::{Address, BlockRange, B256};

pub use self::abi::{
    event_signatures, BlockHeaderCommitted, BlockHeaderRefunded, BlockHeaderRequested,
    BlockHeaderResponded, COMMITTED_EVENT, REFUNDED_EVENT, REQUESTED_EVENT, RESPONDED_EVENT,
};
pub use self::http::{JsonRpcProvider, JsonRpcProviderFactory, JsonRpcProviderOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The endpoint asked us to slow down.
    RateLimited,
    /// Any other request failure.
    Transport,
    /// The request did not complete in time.
    Timeout,
    /// The provider could not be created or the request is not representable.
    Configuration,
}

impl error_stack::Context for ProviderError {}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::RateLimited => write!(f, "rate limited"),
            ProviderError::Transport => write!(f, "failed to send request"),
            ProviderError::Timeout => write!(f, "request timed out"),
            ProviderError::Configuration => write!(f, "provider configuration error"),
        }
    }
}

pub trait ProviderErrorExt {
    fn is_rate_limited(&self) -> bool;
}

impl ProviderErrorExt for Report<ProviderError> {
    fn is_rate_limited(&self) -> bool {
        matches!(self.current_context(), ProviderError::RateLimited)
    }
}

/// A decoded event argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    Address(Address),
    Uint(U256),
}

/// A chain log after ABI decoding.
///
/// The emitting block and transaction are optional because nodes return them
/// empty for pending logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub event_name: String,
    pub args: BTreeMap<String, LogValue>,
    pub block_number: Option<U256>,
    pub transaction_hash: Option<B256>,
    pub block_hash: Option<B256>,
}

impl DecodedLog {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            args: BTreeMap::new(),
            block_number: None,
            transaction_hash: None,
            block_hash: None,
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: LogValue) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    pub fn with_emitter<N>(mut self, block_number: N, transaction_hash: B256, block_hash: B256) -> Self
    where
        U256: UintTryFrom<N>,
    {
        self.block_number = Some(U256::from(block_number));
        self.transaction_hash = Some(transaction_hash);
        self.block_hash = Some(block_hash);
        self
    }
}

/// Which logs to fetch, on top of the fixed event signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
}

#[async_trait]
pub trait LogProvider: Clone + Send + Sync + 'static {
    async fn latest_block_number(&self) -> Result<U256, ProviderError>;

    async fn get_logs(
        &self,
        filter: &LogFilter,
        range: BlockRange,
    ) -> Result<Vec<DecodedLog>, ProviderError>;
}

/// Creates providers bound to one endpoint.
pub trait ProviderFactory: Send + Sync {
    type Provider: LogProvider;

    fn connect(&self, endpoint: &Url) -> Result<Self::Provider, ProviderError>;
}
