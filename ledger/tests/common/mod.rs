#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy::primitives::{address, Address, B256, U256};
use async_trait::async_trait;
use error_stack::{Report, Result};
use header_ledger::{
    config::NetworkSource,
    core::BlockRange,
    provider::{
        DecodedLog, LogFilter, LogProvider, LogValue, ProviderError, ProviderFactory,
        COMMITTED_EVENT, REFUNDED_EVENT, REQUESTED_EVENT, RESPONDED_EVENT,
    },
};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;
use wiremock::{http::Method, Match, Request, Respond, ResponseTemplate};

pub const CONTRACT: Address = address!("00000000000000000000000000000000000000aa");

#[derive(Debug, Default)]
struct ChainState {
    latest_block: U256,
    logs: Vec<DecodedLog>,
    failure: Option<ProviderError>,
    get_logs_calls: usize,
}

/// In-memory chain shared by every provider the factory creates.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(latest_block: u64) -> Self {
        let chain = Self::default();
        chain.set_latest_block(latest_block);
        chain
    }

    pub fn set_latest_block(&self, latest_block: u64) {
        self.state.lock().unwrap().latest_block = U256::from(latest_block);
    }

    pub fn push_log(&self, log: DecodedLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Fail every `eth_getLogs` call with `failure`.
    pub fn fail_get_logs(&self, failure: Option<ProviderError>) {
        self.state.lock().unwrap().failure = failure;
    }

    pub fn get_logs_calls(&self) -> usize {
        self.state.lock().unwrap().get_logs_calls
    }
}

#[async_trait]
impl LogProvider for MockChain {
    async fn latest_block_number(&self) -> Result<U256, ProviderError> {
        Ok(self.state.lock().unwrap().latest_block)
    }

    async fn get_logs(
        &self,
        _filter: &LogFilter,
        range: BlockRange,
    ) -> Result<Vec<DecodedLog>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.get_logs_calls += 1;

        if let Some(failure) = state.failure.clone() {
            return Err(Report::new(failure));
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .map_or(false, |number| number >= range.from && number <= range.to)
            })
            .cloned()
            .collect())
    }
}

impl ProviderFactory for MockChain {
    type Provider = MockChain;

    fn connect(&self, _endpoint: &Url) -> Result<Self::Provider, ProviderError> {
        Ok(self.clone())
    }
}

pub fn network(name: &str, from_block: u64) -> NetworkSource {
    NetworkSource {
        name: name.to_string(),
        chain_id: 1,
        rpcs: vec![
            Url::parse("https://rpc-0.example.org").unwrap(),
            Url::parse("https://rpc-1.example.org").unwrap(),
        ],
        from_block: U256::from(from_block),
        address: Some(CONTRACT),
    }
}

fn emitted(log: DecodedLog, emitted_in: u64) -> DecodedLog {
    log.with_emitter(
        emitted_in,
        B256::left_padding_from(&(emitted_in * 10).to_be_bytes()),
        B256::left_padding_from(&emitted_in.to_be_bytes()),
    )
}

pub fn request_log(block: u64, index: u64, reward: u64, emitted_in: u64) -> DecodedLog {
    emitted(
        DecodedLog::new(REQUESTED_EVENT)
            .with_arg("contractAddress", LogValue::Address(CONTRACT))
            .with_arg("blockNumber", LogValue::Uint(U256::from(block)))
            .with_arg("headerIndex", LogValue::Uint(U256::from(index)))
            .with_arg("rewardAmount", LogValue::Uint(U256::from(reward))),
        emitted_in,
    )
}

pub fn response_log(block: u64, index: u64, responder: u8, emitted_in: u64) -> DecodedLog {
    emitted(
        DecodedLog::new(RESPONDED_EVENT)
            .with_arg("contractAddress", LogValue::Address(CONTRACT))
            .with_arg("blockNumber", LogValue::Uint(U256::from(block)))
            .with_arg("headerIndex", LogValue::Uint(U256::from(index)))
            .with_arg("responder", LogValue::Address(Address::with_last_byte(responder))),
        emitted_in,
    )
}

pub fn commit_log(block: u64, emitted_in: u64) -> DecodedLog {
    emitted(
        DecodedLog::new(COMMITTED_EVENT).with_arg("blockNumber", LogValue::Uint(U256::from(block))),
        emitted_in,
    )
}

pub fn refund_log(block: u64, index: u64, emitted_in: u64) -> DecodedLog {
    emitted(
        DecodedLog::new(REFUNDED_EVENT)
            .with_arg("blockNumber", LogValue::Uint(U256::from(block)))
            .with_arg("headerIndex", LogValue::Uint(U256::from(index))),
        emitted_in,
    )
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
}

/// Matches json-rpc requests by method name.
pub struct RpcMethodMatcher {
    method: String,
}

pub fn rpc_method(method: impl Into<String>) -> RpcMethodMatcher {
    RpcMethodMatcher {
        method: method.into(),
    }
}

impl Match for RpcMethodMatcher {
    fn matches(&self, req: &Request) -> bool {
        if req.method != Method::POST {
            return false;
        }

        serde_json::from_slice::<RpcRequest>(&req.body)
            .map(|rpc_req| rpc_req.method == self.method)
            .unwrap_or(false)
    }
}

pub struct RpcResponse {
    result: Value,
}

impl RpcResponse {
    pub fn new(result: Value) -> Self {
        Self { result }
    }
}

impl Respond for RpcResponse {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        if let Ok(rpc_req) = serde_json::from_slice::<RpcRequest>(&req.body) {
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": rpc_req.id,
                "result": self.result,
            }))
        } else {
            ResponseTemplate::new(400)
        }
    }
}

pub struct RpcErrorResponse {
    code: i64,
    message: String,
}

impl RpcErrorResponse {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Respond for RpcErrorResponse {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        if let Ok(rpc_req) = serde_json::from_slice::<RpcRequest>(&req.body) {
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": rpc_req.id,
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            }))
        } else {
            ResponseTemplate::new(400)
        }
    }
}
