//! Map decoded logs onto [CanonicalEvent]s.
use alloy::primitives::U256;
use error_stack::{Result, ResultExt};
use time::OffsetDateTime;

use crate::{
    core::{Address, ChainId},
    error::LedgerError,
    provider::{
        DecodedLog, LogValue, COMMITTED_EVENT, REFUNDED_EVENT, REQUESTED_EVENT, RESPONDED_EVENT,
    },
    reconcile::{CanonicalEvent, EmittedIn, EventKind, RefundInfo, RequestInfo, ResponseInfo},
};

/// Classify one decoded log.
///
/// Returns `Ok(None)` for logs of unrelated events. A tracked event with a
/// missing or mistyped argument, or without the emitting transaction, is a
/// [LedgerError::MalformedLog].
pub fn classify(
    chain_id: ChainId,
    log: &DecodedLog,
    observed_at: OffsetDateTime,
) -> Result<Option<CanonicalEvent>, LedgerError> {
    let event_name = log.event_name.as_str();
    if !matches!(
        event_name,
        REQUESTED_EVENT | RESPONDED_EVENT | COMMITTED_EVENT | REFUNDED_EVENT
    ) {
        return Ok(None);
    }

    let args = LogArgs(log);
    let emitted = emitted_in(log).attach_printable_lazy(|| format!("event: {event_name}"))?;
    let block_number = args.uint("blockNumber")?;

    let kind = match event_name {
        REQUESTED_EVENT => EventKind::Request {
            header_index: args.uint("headerIndex")?,
            request: RequestInfo {
                reward_amount: args.uint("rewardAmount")?,
                contract_address: args.address("contractAddress")?,
                emitted,
            },
        },
        RESPONDED_EVENT => EventKind::Response {
            header_index: args.uint("headerIndex")?,
            response: ResponseInfo {
                contract_address: args.address("contractAddress")?,
                responder: args.address("responder")?,
                emitted,
            },
        },
        COMMITTED_EVENT => EventKind::Commit { commit: emitted },
        _ => EventKind::Refund {
            header_index: args.uint("headerIndex")?,
            refund: RefundInfo { emitted },
        },
    };

    Ok(Some(CanonicalEvent {
        chain_id,
        block_number,
        observed_at,
        kind,
    }))
}

fn emitted_in(log: &DecodedLog) -> Result<EmittedIn, LedgerError> {
    match (log.block_number, log.transaction_hash, log.block_hash) {
        (Some(block_number), Some(transaction_hash), Some(block_hash)) => Ok(EmittedIn {
            block_number,
            transaction_hash,
            block_hash,
        }),
        _ => Err(LedgerError::MalformedLog)
            .attach_printable("log is missing the emitting block or transaction"),
    }
}

struct LogArgs<'a>(&'a DecodedLog);

impl LogArgs<'_> {
    fn get(&self, name: &str) -> Result<&LogValue, LedgerError> {
        self.0
            .args
            .get(name)
            .ok_or(LedgerError::MalformedLog)
            .attach_printable_lazy(|| format!("missing argument: {name}"))
            .attach_printable_lazy(|| format!("event: {}", self.0.event_name))
    }

    fn uint(&self, name: &str) -> Result<U256, LedgerError> {
        match self.get(name)? {
            LogValue::Uint(value) => Ok(*value),
            other => Err(LedgerError::MalformedLog)
                .attach_printable_lazy(|| format!("argument {name} is not an integer: {other:?}")),
        }
    }

    fn address(&self, name: &str) -> Result<Address, LedgerError> {
        match self.get(name)? {
            LogValue::Address(value) => Ok(*value),
            other => Err(LedgerError::MalformedLog)
                .attach_printable_lazy(|| format!("argument {name} is not an address: {other:?}")),
        }
    }
}
