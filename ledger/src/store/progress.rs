use std::collections::BTreeMap;

use alloy::primitives::U256;
use error_stack::Result;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    core::{decimal, BlockRange},
    error::LedgerError,
};

use super::{local::LocalStore, partition::day_path};

const PROGRESS_FILE: &str = "progress.json";
const RANGES_FILE: &str = "ranges.json";
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(with = "decimal")]
    pub next_fetch_from: U256,
}

/// Lowest and highest block scanned during one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedRange {
    #[serde(with = "decimal")]
    pub start_block: U256,
    #[serde(with = "decimal")]
    pub end_block: U256,
}

/// Scanned ranges keyed by `YYYY/MM/DD`.
pub type RangeHistory = BTreeMap<String, ScannedRange>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistory {
    #[serde(default)]
    pub updates: Vec<UpdateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub updated_block_numbers: Vec<String>,
}

/// What a completed run contributes to the progress artifacts.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub finished_at: OffsetDateTime,
    pub date: Date,
    pub range: BlockRange,
    /// Block numbers whose records changed, in any order.
    pub updated_blocks: Vec<U256>,
}

/// Per network fetch cursor, scanned range history and update log.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: LocalStore,
}

impl ProgressTracker {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Next block to fetch, or `default` if nothing was persisted yet.
    pub async fn next_fetch_from(&self, default: U256) -> Result<U256, LedgerError> {
        let progress: Option<Progress> = self.store.get_json(PROGRESS_FILE).await?;
        Ok(progress.map_or(default, |p| p.next_fetch_from))
    }

    pub async fn ranges(&self) -> Result<RangeHistory, LedgerError> {
        Ok(self.store.get_json(RANGES_FILE).await?.unwrap_or_default())
    }

    pub async fn history(&self) -> Result<UpdateHistory, LedgerError> {
        Ok(self.store.get_json(HISTORY_FILE).await?.unwrap_or_default())
    }

    /// Record a completed run.
    ///
    /// The cursor is written last and never moves backwards.
    pub async fn record_run(&self, summary: RunSummary) -> Result<U256, LedgerError> {
        let mut history = self.history().await?;
        let mut updated_blocks = summary.updated_blocks;
        updated_blocks.sort();
        updated_blocks.dedup();
        history.updates.push(UpdateEntry {
            timestamp: summary.finished_at,
            updated_block_numbers: updated_blocks.iter().map(ToString::to_string).collect(),
        });
        self.store.put_json(HISTORY_FILE, &history).await?;

        let mut ranges = self.ranges().await?;
        let range = summary.range;
        ranges
            .entry(day_path(summary.date))
            .and_modify(|scanned| {
                scanned.start_block = scanned.start_block.min(range.from);
                scanned.end_block = scanned.end_block.max(range.to);
            })
            .or_insert(ScannedRange {
                start_block: range.from,
                end_block: range.to,
            });
        self.store.put_json(RANGES_FILE, &ranges).await?;

        let current: Option<Progress> = self.store.get_json(PROGRESS_FILE).await?;
        let candidate = range.to.saturating_add(U256::from(1));
        let next_fetch_from = match current {
            Some(current) => current.next_fetch_from.max(candidate),
            None => candidate,
        };
        self.store
            .put_json(PROGRESS_FILE, &Progress { next_fetch_from })
            .await?;

        Ok(next_fetch_from)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use tempfile::TempDir;
    use time::macros::{date, datetime};

    use super::{ProgressTracker, RunSummary, ScannedRange};
    use crate::{core::BlockRange, store::local::LocalStore};

    fn summary(from: u64, to: u64) -> RunSummary {
        RunSummary {
            finished_at: datetime!(2024-12-20 10:00 UTC),
            date: date!(2024 - 12 - 20),
            range: BlockRange::new(from, to),
            updated_blocks: vec![U256::from(7), U256::from(5), U256::from(7)],
        }
    }

    #[tokio::test]
    async fn test_progress_never_moves_backwards() {
        let root = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(LocalStore::new(root.path()));

        assert_eq!(tracker.next_fetch_from(U256::from(100)).await.unwrap(), U256::from(100));

        let next = tracker.record_run(summary(100, 2500)).await.unwrap();
        assert_eq!(next, U256::from(2501));

        let next = tracker.record_run(summary(50, 60)).await.unwrap();
        assert_eq!(next, U256::from(2501));
        assert_eq!(tracker.next_fetch_from(U256::from(100)).await.unwrap(), U256::from(2501));

        let ranges = tracker.ranges().await.unwrap();
        assert_eq!(
            ranges.get("2024/12/20"),
            Some(&ScannedRange {
                start_block: U256::from(50),
                end_block: U256::from(2500),
            })
        );

        let history = tracker.history().await.unwrap();
        assert_eq!(history.updates.len(), 2);
        assert_eq!(history.updates[0].updated_block_numbers, vec!["5", "7"]);
    }

    #[tokio::test]
    async fn test_progress_file_format() {
        let root = TempDir::new().unwrap();
        let tracker = ProgressTracker::new(LocalStore::new(root.path()));
        tracker.record_run(summary(1, 2)).await.unwrap();

        let content = std::fs::read_to_string(root.path().join("progress.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value, serde_json::json!({ "nextFetchFrom": "3" }));
    }
}
