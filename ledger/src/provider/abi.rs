use alloy::{primitives::U256, rpc::types::Log, sol, sol_types::SolEvent};

use crate::core::B256;

use super::{DecodedLog, LogValue};

sol! {
    event BlockHeaderRequested(
        address indexed contractAddress,
        uint256 indexed blockNumber,
        uint256 indexed headerIndex,
        uint256 rewardAmount
    );

    event BlockHeaderResponded(
        address indexed contractAddress,
        uint256 indexed blockNumber,
        uint256 headerIndex,
        address indexed responder
    );

    event BlockHeaderCommitted(uint256 indexed blockNumber);

    event BlockHeaderRefunded(uint256 indexed blockNumber, uint256 indexed headerIndex);
}

pub const REQUESTED_EVENT: &str = "BlockHeaderRequested";
pub const RESPONDED_EVENT: &str = "BlockHeaderResponded";
pub const COMMITTED_EVENT: &str = "BlockHeaderCommitted";
pub const REFUNDED_EVENT: &str = "BlockHeaderRefunded";

/// Topic0 of every tracked event.
pub fn event_signatures() -> Vec<B256> {
    vec![
        BlockHeaderRequested::SIGNATURE_HASH,
        BlockHeaderResponded::SIGNATURE_HASH,
        BlockHeaderCommitted::SIGNATURE_HASH,
        BlockHeaderRefunded::SIGNATURE_HASH,
    ]
}

/// Decode a raw log into a [DecodedLog].
///
/// Returns `None` if the log is not one of the tracked events. A tracked event
/// that fails to decode is returned without arguments.
pub fn decode_log(log: &Log) -> Option<DecodedLog> {
    let topic0 = *log.topic0()?;

    let decoded = if topic0 == BlockHeaderRequested::SIGNATURE_HASH {
        let mut decoded = DecodedLog::new(REQUESTED_EVENT);
        if let Ok(event) = log.log_decode::<BlockHeaderRequested>() {
            let event = event.inner.data;
            decoded = decoded
                .with_arg("contractAddress", LogValue::Address(event.contractAddress))
                .with_arg("blockNumber", LogValue::Uint(event.blockNumber))
                .with_arg("headerIndex", LogValue::Uint(event.headerIndex))
                .with_arg("rewardAmount", LogValue::Uint(event.rewardAmount));
        }
        decoded
    } else if topic0 == BlockHeaderResponded::SIGNATURE_HASH {
        let mut decoded = DecodedLog::new(RESPONDED_EVENT);
        if let Ok(event) = log.log_decode::<BlockHeaderResponded>() {
            let event = event.inner.data;
            decoded = decoded
                .with_arg("contractAddress", LogValue::Address(event.contractAddress))
                .with_arg("blockNumber", LogValue::Uint(event.blockNumber))
                .with_arg("headerIndex", LogValue::Uint(event.headerIndex))
                .with_arg("responder", LogValue::Address(event.responder));
        }
        decoded
    } else if topic0 == BlockHeaderCommitted::SIGNATURE_HASH {
        let mut decoded = DecodedLog::new(COMMITTED_EVENT);
        if let Ok(event) = log.log_decode::<BlockHeaderCommitted>() {
            decoded = decoded.with_arg("blockNumber", LogValue::Uint(event.inner.data.blockNumber));
        }
        decoded
    } else if topic0 == BlockHeaderRefunded::SIGNATURE_HASH {
        let mut decoded = DecodedLog::new(REFUNDED_EVENT);
        if let Ok(event) = log.log_decode::<BlockHeaderRefunded>() {
            let event = event.inner.data;
            decoded = decoded
                .with_arg("blockNumber", LogValue::Uint(event.blockNumber))
                .with_arg("headerIndex", LogValue::Uint(event.headerIndex));
        }
        decoded
    } else {
        return None;
    };

    Some(DecodedLog {
        block_number: log.block_number.map(U256::from),
        transaction_hash: log.transaction_hash,
        block_hash: log.block_hash,
        ..decoded
    })
}
