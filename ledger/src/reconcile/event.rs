use alloy::primitives::U256;
use time::OffsetDateTime;

use crate::core::ChainId;

use super::record::{EmittedIn, NaturalKey, RefundInfo, RequestInfo, ResponseInfo};

/// A classified contract event, ready to be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub chain_id: ChainId,
    /// Block number referenced by the event, not the block that emitted it.
    pub block_number: U256,
    /// When the event was observed by the indexer.
    pub observed_at: OffsetDateTime,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Request {
        header_index: U256,
        request: RequestInfo,
    },
    Response {
        header_index: U256,
        response: ResponseInfo,
    },
    /// Applies to every header index of the block number.
    Commit { commit: EmittedIn },
    Refund {
        header_index: U256,
        refund: RefundInfo,
    },
}

impl CanonicalEvent {
    pub fn header_index(&self) -> Option<U256> {
        match &self.kind {
            EventKind::Request { header_index, .. }
            | EventKind::Response { header_index, .. }
            | EventKind::Refund { header_index, .. } => Some(*header_index),
            EventKind::Commit { .. } => None,
        }
    }

    pub fn key(&self) -> NaturalKey {
        match self.header_index() {
            Some(header_index) => NaturalKey::header(self.block_number, header_index),
            None => NaturalKey::committed(self.block_number),
        }
    }
}
