use std::time::Duration;

use alloy::{
    primitives::U256,
    providers::{Provider, RootProvider},
    rpc::types::Filter,
    transports::{
        http::{Client, Http},
        RpcError, TransportError, TransportErrorKind,
    },
};
use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use header_ledger_observability::{RecordRequest, RequestMetrics};
use tracing::debug;
use url::Url;

use crate::core::BlockRange;

use super::{abi, DecodedLog, LogFilter, LogProvider, ProviderError, ProviderFactory};

const HTTP_TOO_MANY_REQUESTS: u16 = 429;
/// Returned by several providers (e.g. Infura) when the request quota is exceeded.
const JSON_RPC_LIMIT_EXCEEDED: i64 = -32005;

#[derive(Debug, Clone)]
pub struct JsonRpcProviderOptions {
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for JsonRpcProviderOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct ProviderMetrics {
    block_number: RequestMetrics,
    get_logs: RequestMetrics,
}

impl ProviderMetrics {
    fn new() -> Self {
        Self {
            block_number: RequestMetrics::new("header_ledger", "ledger.rpc.block_number"),
            get_logs: RequestMetrics::new("header_ledger", "ledger.rpc.get_logs"),
        }
    }
}

/// JSON-RPC provider over http.
#[derive(Clone)]
pub struct JsonRpcProvider {
    provider: RootProvider<Http<Client>>,
    endpoint: Url,
    options: JsonRpcProviderOptions,
    metrics: ProviderMetrics,
}

impl JsonRpcProvider {
    pub fn new(endpoint: Url, options: JsonRpcProviderOptions) -> Self {
        let provider = RootProvider::new_http(endpoint.clone());

        Self {
            provider,
            endpoint,
            options,
            metrics: ProviderMetrics::new(),
        }
    }
}

#[async_trait]
impl LogProvider for JsonRpcProvider {
    async fn latest_block_number(&self) -> Result<U256, ProviderError> {
        let request = async { self.provider.get_block_number().await }
            .record_request(self.metrics.block_number.clone());

        let Ok(response) = tokio::time::timeout(self.options.timeout, request).await else {
            return Err(ProviderError::Timeout)
                .attach_printable("failed to get latest block number")
                .attach_printable_lazy(|| format!("endpoint: {}", self.endpoint));
        };

        let number = response
            .map_err(classify_transport_error)
            .attach_printable("failed to get latest block number")
            .attach_printable_lazy(|| format!("endpoint: {}", self.endpoint))?;

        Ok(U256::from(number))
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        range: BlockRange,
    ) -> Result<Vec<DecodedLog>, ProviderError> {
        let (Some(from_block), Some(to_block)) = (to_u64(range.from), to_u64(range.to)) else {
            return Err(ProviderError::Configuration)
                .attach_printable("block range does not fit in a u64")
                .attach_printable_lazy(|| format!("range: {range}"));
        };

        let mut rpc_filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(abi::event_signatures());

        if let Some(address) = filter.address {
            rpc_filter = rpc_filter.address(address);
        }

        let request = async { self.provider.get_logs(&rpc_filter).await }
            .record_request(self.metrics.get_logs.clone());

        let Ok(response) = tokio::time::timeout(self.options.timeout, request).await else {
            return Err(ProviderError::Timeout)
                .attach_printable("failed to get logs")
                .attach_printable_lazy(|| format!("range: {range}"))
                .attach_printable_lazy(|| format!("endpoint: {}", self.endpoint));
        };

        let logs = response
            .map_err(classify_transport_error)
            .attach_printable("failed to get logs")
            .attach_printable_lazy(|| format!("range: {range}"))
            .attach_printable_lazy(|| format!("endpoint: {}", self.endpoint))?;

        let fetched = logs.len();
        let decoded = logs.iter().filter_map(abi::decode_log).collect::<Vec<_>>();
        debug!(%range, fetched, decoded = decoded.len(), "fetched logs");

        Ok(decoded)
    }
}

/// Builds a [JsonRpcProvider] for each endpoint.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcProviderFactory {
    options: JsonRpcProviderOptions,
}

impl JsonRpcProviderFactory {
    pub fn new(options: JsonRpcProviderOptions) -> Self {
        Self { options }
    }
}

impl ProviderFactory for JsonRpcProviderFactory {
    type Provider = JsonRpcProvider;

    fn connect(&self, endpoint: &Url) -> Result<Self::Provider, ProviderError> {
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ProviderError::Configuration)
                .attach_printable("only http(s) endpoints are supported")
                .attach_printable_lazy(|| format!("endpoint: {endpoint}"));
        }

        Ok(JsonRpcProvider::new(endpoint.clone(), self.options.clone()))
    }
}

fn is_rate_limit(err: &TransportError) -> bool {
    match err {
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            http.status == HTTP_TOO_MANY_REQUESTS
        }
        RpcError::ErrorResp(payload) => {
            payload.code == i64::from(HTTP_TOO_MANY_REQUESTS)
                || payload.code == JSON_RPC_LIMIT_EXCEEDED
        }
        _ => false,
    }
}

fn classify_transport_error(err: TransportError) -> error_stack::Report<ProviderError> {
    let context = if is_rate_limit(&err) {
        ProviderError::RateLimited
    } else {
        ProviderError::Transport
    };

    error_stack::Report::new(err).change_context(context)
}

fn to_u64(value: U256) -> Option<u64> {
    u64::try_from(value).ok()
}
