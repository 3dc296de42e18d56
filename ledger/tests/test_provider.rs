mod common;

use alloy::{
    primitives::{Address, Bytes, B256, U256},
    sol_types::SolEvent,
};
use assert_matches::assert_matches;
use header_ledger::{
    core::BlockRange,
    provider::{
        BlockHeaderCommitted, BlockHeaderRequested, JsonRpcProviderFactory, LogFilter, LogProvider,
        LogValue, ProviderError, ProviderFactory, COMMITTED_EVENT, REQUESTED_EVENT,
    },
};
use serde_json::{json, Value};
use url::Url;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{rpc_method, RpcErrorResponse, RpcResponse, CONTRACT};

async fn provider_for(server: &MockServer) -> impl LogProvider {
    let endpoint = Url::parse(&server.uri()).unwrap();
    JsonRpcProviderFactory::default().connect(&endpoint).unwrap()
}

fn word(value: u64) -> B256 {
    B256::left_padding_from(&value.to_be_bytes())
}

fn address_topic(address: Address) -> B256 {
    B256::left_padding_from(address.as_slice())
}

fn rpc_log(topics: Vec<B256>, data: Vec<u8>, block_number: u64) -> Value {
    json!({
        "address": CONTRACT,
        "topics": topics,
        "data": Bytes::from(data),
        "blockNumber": format!("{block_number:#x}"),
        "blockHash": word(block_number),
        "transactionHash": word(block_number * 10),
        "transactionIndex": "0x0",
        "logIndex": "0x0",
        "removed": false,
    })
}

#[tokio::test]
async fn test_latest_block_number() {
    let server = MockServer::start().await;
    Mock::given(rpc_method("eth_blockNumber"))
        .respond_with(RpcResponse::new(json!("0x3e8")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let number = provider.latest_block_number().await.unwrap();
    assert_eq!(number, U256::from(1000));
}

#[tokio::test]
async fn test_http_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(rpc_method("eth_blockNumber"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let err = provider.latest_block_number().await.unwrap_err();
    assert_matches!(err.current_context(), ProviderError::RateLimited);
}

#[tokio::test]
async fn test_limit_exceeded_error_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(rpc_method("eth_getLogs"))
        .respond_with(RpcErrorResponse::new(-32005, "limit exceeded"))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let err = provider
        .get_logs(&LogFilter::default(), BlockRange::new(1u64, 10u64))
        .await
        .unwrap_err();
    assert_matches!(err.current_context(), ProviderError::RateLimited);
}

#[tokio::test]
async fn test_other_failures_are_transport_errors() {
    let server = MockServer::start().await;
    Mock::given(rpc_method("eth_blockNumber"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(rpc_method("eth_getLogs"))
        .respond_with(RpcErrorResponse::new(-32602, "invalid params"))
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;

    let err = provider.latest_block_number().await.unwrap_err();
    assert_matches!(err.current_context(), ProviderError::Transport);

    let err = provider
        .get_logs(&LogFilter::default(), BlockRange::new(1u64, 10u64))
        .await
        .unwrap_err();
    assert_matches!(err.current_context(), ProviderError::Transport);
}

#[tokio::test]
async fn test_get_logs_decodes_tracked_events() {
    let server = MockServer::start().await;

    let requested = rpc_log(
        vec![
            BlockHeaderRequested::SIGNATURE_HASH,
            address_topic(CONTRACT),
            word(1000),
            word(2),
        ],
        word(500).to_vec(),
        1100,
    );
    let committed = rpc_log(
        vec![BlockHeaderCommitted::SIGNATURE_HASH, word(1000)],
        Vec::new(),
        1101,
    );
    // Matches the requested signature but lacks the indexed arguments.
    let truncated = rpc_log(vec![BlockHeaderRequested::SIGNATURE_HASH], Vec::new(), 1102);
    let unrelated = rpc_log(vec![word(42)], Vec::new(), 1103);

    Mock::given(rpc_method("eth_getLogs"))
        .respond_with(RpcResponse::new(json!([
            requested, committed, truncated, unrelated
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server).await;
    let filter = LogFilter {
        address: Some(CONTRACT),
    };
    let logs = provider
        .get_logs(&filter, BlockRange::new(1000u64, 1200u64))
        .await
        .unwrap();

    assert_eq!(logs.len(), 3);

    assert_eq!(logs[0].event_name, REQUESTED_EVENT);
    assert_eq!(logs[0].block_number, Some(U256::from(1100)));
    assert_eq!(logs[0].transaction_hash, Some(word(11000)));
    assert_eq!(logs[0].args.get("contractAddress"), Some(&LogValue::Address(CONTRACT)));
    assert_eq!(logs[0].args.get("blockNumber"), Some(&LogValue::Uint(U256::from(1000))));
    assert_eq!(logs[0].args.get("headerIndex"), Some(&LogValue::Uint(U256::from(2))));
    assert_eq!(logs[0].args.get("rewardAmount"), Some(&LogValue::Uint(U256::from(500))));

    assert_eq!(logs[1].event_name, COMMITTED_EVENT);
    assert_eq!(logs[1].args.get("blockNumber"), Some(&LogValue::Uint(U256::from(1000))));

    assert_eq!(logs[2].event_name, REQUESTED_EVENT);
    assert!(logs[2].args.is_empty());
}
