use std::{cmp::Ordering, fmt};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{decimal, Address, ChainId, B256};

/// Where a contract event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedIn {
    #[serde(with = "decimal")]
    pub block_number: U256,
    pub transaction_hash: B256,
    pub block_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(with = "decimal")]
    pub reward_amount: U256,
    pub contract_address: Address,
    #[serde(flatten)]
    pub emitted: EmittedIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    pub contract_address: Address,
    pub responder: Address,
    #[serde(flatten)]
    pub emitted: EmittedIn,
}

/// Commit data shared by every header index of a block number.
///
/// `observed_at` is when the commit was first seen with this data. It is not
/// part of the commit identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    #[serde(flatten)]
    pub emitted: EmittedIn,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl CommitInfo {
    pub fn same_commit(&self, other: &CommitInfo) -> bool {
        self.emitted == other.emitted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundInfo {
    #[serde(flatten)]
    pub emitted: EmittedIn,
}

/// Identity of a [LifecycleRecord] within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    /// A record for one attestation attempt.
    Header {
        block_number: U256,
        header_index: U256,
    },
    /// Placeholder holding a commit seen before any header-indexed fragment.
    Committed { block_number: U256 },
}

impl NaturalKey {
    pub fn header(block_number: U256, header_index: U256) -> Self {
        NaturalKey::Header {
            block_number,
            header_index,
        }
    }

    pub fn committed(block_number: U256) -> Self {
        NaturalKey::Committed { block_number }
    }

    pub fn block_number(&self) -> U256 {
        match self {
            NaturalKey::Header { block_number, .. } => *block_number,
            NaturalKey::Committed { block_number } => *block_number,
        }
    }

    pub fn header_index(&self) -> Option<U256> {
        match self {
            NaturalKey::Header { header_index, .. } => Some(*header_index),
            NaturalKey::Committed { .. } => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, NaturalKey::Committed { .. })
    }
}

// Keys of the same block number sort together, header indices first.
impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_number()
            .cmp(&other.block_number())
            .then_with(|| self.is_committed().cmp(&other.is_committed()))
            .then_with(|| self.header_index().cmp(&other.header_index()))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Header {
                block_number,
                header_index,
            } => write!(f, "{block_number}/{header_index}"),
            NaturalKey::Committed { block_number } => write!(f, "{block_number}/committed"),
        }
    }
}

/// Reconciled state of one natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    pub chain_id: ChainId,
    #[serde(with = "decimal")]
    pub block_number: U256,
    #[serde(
        with = "decimal::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub header_index: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    /// In arrival order, unique by transaction hash.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ResponseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<RefundInfo>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl LifecycleRecord {
    pub fn new(chain_id: ChainId, key: NaturalKey, at: OffsetDateTime) -> Self {
        Self {
            chain_id,
            block_number: key.block_number(),
            header_index: key.header_index(),
            request: None,
            responses: Vec::new(),
            commit: None,
            refund: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn key(&self) -> NaturalKey {
        match self.header_index {
            Some(header_index) => NaturalKey::header(self.block_number, header_index),
            None => NaturalKey::committed(self.block_number),
        }
    }

    pub fn has_response(&self, transaction_hash: &B256) -> bool {
        self.responses
            .iter()
            .any(|response| &response.emitted.transaction_hash == transaction_hash)
    }

    /// Record a contribution observed at `at`.
    pub fn touch(&mut self, at: OffsetDateTime) {
        self.updated_at = self.updated_at.max(at);
    }

    /// Replace the commit unless it already carries the same data.
    ///
    /// Returns whether the record changed.
    pub fn set_commit(&mut self, commit: &CommitInfo) -> bool {
        if let Some(current) = &self.commit {
            if current.same_commit(commit) {
                return false;
            }
        }

        self.commit = Some(commit.clone());
        self.touch(commit.observed_at);
        true
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use time::macros::datetime;

    use super::{LifecycleRecord, NaturalKey};

    #[test]
    fn test_keys_of_a_block_sort_together() {
        let mut keys = vec![
            NaturalKey::committed(U256::from(10)),
            NaturalKey::header(U256::from(11), U256::from(0)),
            NaturalKey::header(U256::from(10), U256::from(2)),
            NaturalKey::header(U256::from(10), U256::from(1)),
        ];
        keys.sort();

        let rendered = keys.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["10/1", "10/2", "10/committed", "11/0"]);
    }

    #[test]
    fn test_empty_record_serialization_skips_absent_fields() {
        let at = datetime!(2024-12-20 10:00 UTC);
        let record = LifecycleRecord::new(1, NaturalKey::committed(U256::from(1000)), at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "chainId": 1,
                "blockNumber": "1000",
                "createdAt": "2024-12-20T10:00:00Z",
                "updatedAt": "2024-12-20T10:00:00Z",
            })
        );

        let back: LifecycleRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert!(back.key().is_committed());
    }
}
