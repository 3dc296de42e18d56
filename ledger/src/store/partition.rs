use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
};

use alloy::primitives::U256;
use error_stack::{Result, ResultExt};
use time::{Date, Month};
use tracing::debug;

use crate::{
    core::parse_decimal,
    error::LedgerError,
    reconcile::{fold_partitions, merge, CanonicalEvent, LifecycleRecord},
};

use super::local::LocalStore;

const INDEX_FILE: &str = "index.json";
const MAP_FILE: &str = "map.json";

/// How block numbers are assigned to day partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PartitionPolicy {
    /// A block number stays in the day it was first observed.
    #[default]
    Sticky,
    /// Fragments go to the day of the run. Roll-ups merge across days.
    Recency,
}

impl fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionPolicy::Sticky => write!(f, "sticky"),
            PartitionPolicy::Recency => write!(f, "recency"),
        }
    }
}

/// Relative directory of a day partition, `YYYY/MM/DD`.
pub fn day_path(date: Date) -> String {
    format!(
        "{:04}/{:02}/{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parse a `YYYY/MM/DD` day path.
pub fn parse_day_path(path: &str) -> Option<Date> {
    let mut parts = path.split('/');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_path(year: i32, month: Month) -> String {
    format!("{:04}/{:02}", year, u8::from(month))
}

fn year_path(year: i32) -> String {
    format!("{:04}", year)
}

fn block_file(date: Date, block_number: U256) -> PathBuf {
    PathBuf::from(day_path(date)).join(format!("{block_number}.json"))
}

/// Day partitions and their month and year roll-ups for one network.
pub struct PartitionStore {
    store: LocalStore,
    policy: PartitionPolicy,
    /// Sticky assignment of block numbers to days.
    dates: BTreeMap<U256, Date>,
    dates_changed: bool,
}

impl PartitionStore {
    /// Open the partitions under `store`, loading the block to day map when
    /// the policy is sticky.
    pub async fn open(store: LocalStore, policy: PartitionPolicy) -> Result<Self, LedgerError> {
        let dates = match policy {
            PartitionPolicy::Sticky => load_dates(&store).await?,
            PartitionPolicy::Recency => BTreeMap::new(),
        };

        Ok(Self {
            store,
            policy,
            dates,
            dates_changed: false,
        })
    }

    /// The day partition that fragments of `block_number` observed on `today`
    /// belong to.
    pub fn partition_for(&mut self, block_number: U256, today: Date) -> Date {
        match self.policy {
            PartitionPolicy::Recency => today,
            PartitionPolicy::Sticky => *self.dates.entry(block_number).or_insert_with(|| {
                self.dates_changed = true;
                today
            }),
        }
    }

    /// Merge `events` into the records of `block_number` in the `date` partition.
    pub async fn merge_block(
        &self,
        date: Date,
        block_number: U256,
        events: Vec<CanonicalEvent>,
    ) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let path = block_file(date, block_number);
        let existing: Vec<LifecycleRecord> = self.store.get_json(&path).await?.unwrap_or_default();

        let records = merge(existing, events);
        self.store
            .put_json(&path, &records)
            .await
            .attach_printable_lazy(|| format!("block number: {block_number}"))?;

        Ok(records)
    }

    /// Persist the block to day map if it changed.
    pub async fn save_map(&mut self) -> Result<(), LedgerError> {
        if !self.dates_changed {
            return Ok(());
        }

        let map = self
            .dates
            .iter()
            .map(|(block_number, date)| (block_number.to_string(), day_path(*date)))
            .collect::<BTreeMap<_, _>>();
        self.store.put_json(MAP_FILE, &map).await?;
        self.dates_changed = false;
        Ok(())
    }

    /// Rebuild the roll-ups of the given days and of their months and years.
    pub async fn rebuild_rollups(&self, days: &BTreeSet<Date>) -> Result<(), LedgerError> {
        let mut months = BTreeSet::new();
        let mut years = BTreeSet::new();

        for day in days {
            self.rebuild_day(*day).await?;
            months.insert((day.year(), day.month()));
            years.insert(day.year());
        }

        for (year, month) in months {
            self.rebuild_month(year, month).await?;
        }

        for year in years {
            self.rebuild_year(year).await?;
        }

        Ok(())
    }

    /// Rebuild every roll-up from the block files on disk.
    ///
    /// Returns the number of day partitions found.
    pub async fn rebuild_all(&self) -> Result<usize, LedgerError> {
        let mut days = BTreeSet::new();
        for year in self.list_numeric(PathBuf::new()).await? {
            for month in self.list_numeric(PathBuf::from(&year)).await? {
                for day in self.list_numeric(PathBuf::from(&year).join(&month)).await? {
                    if let Some(date) = parse_day_path(&format!("{year}/{month}/{day}")) {
                        days.insert(date);
                    }
                }
            }
        }

        self.rebuild_rollups(&days).await?;
        Ok(days.len())
    }

    pub async fn rebuild_day(&self, date: Date) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let dir = PathBuf::from(day_path(date));

        let mut blocks = Vec::new();
        for name in self.store.list(&dir).await? {
            let Some(block_number) = name.strip_suffix(".json").and_then(parse_decimal) else {
                continue;
            };
            blocks.push(block_number);
        }
        blocks.sort();

        let mut partitions = Vec::with_capacity(blocks.len());
        for block_number in blocks {
            let records: Vec<LifecycleRecord> = self
                .store
                .get_json(block_file(date, block_number))
                .await?
                .unwrap_or_default();
            partitions.push(records);
        }

        let records = fold_partitions(partitions);
        debug!(day = %day_path(date), records = records.len(), "rebuilt day index");
        self.store.put_json(dir.join(INDEX_FILE), &records).await?;
        Ok(records)
    }

    pub async fn rebuild_month(
        &self,
        year: i32,
        month: Month,
    ) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let dir = PathBuf::from(month_path(year, month));
        let records = self.fold_children(&dir).await?;
        debug!(month = %month_path(year, month), records = records.len(), "rebuilt month index");
        self.store.put_json(dir.join(INDEX_FILE), &records).await?;
        Ok(records)
    }

    pub async fn rebuild_year(&self, year: i32) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let dir = PathBuf::from(year_path(year));
        let records = self.fold_children(&dir).await?;
        debug!(year = %year_path(year), records = records.len(), "rebuilt year index");
        self.store.put_json(dir.join(INDEX_FILE), &records).await?;
        Ok(records)
    }

    /// Records of the day partition roll-up.
    pub async fn read_day(&self, date: Date) -> Result<Vec<LifecycleRecord>, LedgerError> {
        self.read_index(PathBuf::from(day_path(date))).await
    }

    pub async fn read_month(
        &self,
        year: i32,
        month: Month,
    ) -> Result<Vec<LifecycleRecord>, LedgerError> {
        self.read_index(PathBuf::from(month_path(year, month))).await
    }

    pub async fn read_year(&self, year: i32) -> Result<Vec<LifecycleRecord>, LedgerError> {
        self.read_index(PathBuf::from(year_path(year))).await
    }

    async fn read_index(&self, dir: PathBuf) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let records = self.store.get_json(dir.join(INDEX_FILE)).await?;
        Ok(records.unwrap_or_default())
    }

    /// Fold the `index.json` of every child directory of `dir`.
    async fn fold_children(&self, dir: &Path) -> Result<Vec<LifecycleRecord>, LedgerError> {
        let mut partitions = Vec::new();
        for child in self.list_numeric(dir.to_path_buf()).await? {
            partitions.push(self.read_index(dir.join(child)).await?);
        }
        Ok(fold_partitions(partitions))
    }

    /// Subdirectories of `dir` named by a number, in numeric order.
    async fn list_numeric(&self, dir: PathBuf) -> Result<Vec<String>, LedgerError> {
        let mut names = self
            .store
            .list_dirs(&dir)
            .await?
            .into_iter()
            .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
            .collect::<Vec<_>>();
        names.sort_by_key(|name| name.parse::<u32>().unwrap_or(u32::MAX));
        Ok(names)
    }
}

async fn load_dates(store: &LocalStore) -> Result<BTreeMap<U256, Date>, LedgerError> {
    let map: BTreeMap<String, String> = store.get_json(MAP_FILE).await?.unwrap_or_default();

    map.into_iter()
        .map(|(block_number, day)| {
            let parsed = parse_decimal(&block_number).zip(parse_day_path(&day));
            parsed
                .ok_or(LedgerError::Storage)
                .attach_printable("invalid block to day map entry")
                .attach_printable_lazy(|| format!("entry: {block_number} -> {day}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use alloy::primitives::U256;
    use tempfile::TempDir;
    use time::{macros::date, Month};

    use super::{day_path, parse_day_path, PartitionPolicy, PartitionStore};
    use crate::{
        core::B256,
        reconcile::{CanonicalEvent, EmittedIn, EventKind, NaturalKey, RefundInfo},
        store::local::LocalStore,
    };

    fn refund(block: u64, index: u64) -> CanonicalEvent {
        CanonicalEvent {
            chain_id: 1,
            block_number: U256::from(block),
            observed_at: time::macros::datetime!(2024-12-20 10:00 UTC),
            kind: EventKind::Refund {
                header_index: U256::from(index),
                refund: RefundInfo {
                    emitted: EmittedIn {
                        block_number: U256::from(block + 10),
                        transaction_hash: B256::with_last_byte(1),
                        block_hash: B256::with_last_byte(2),
                    },
                },
            },
        }
    }

    #[test]
    fn test_day_path() {
        let date = date!(2024 - 01 - 05);
        assert_eq!(day_path(date), "2024/01/05");
        assert_eq!(parse_day_path("2024/01/05"), Some(date));
        assert_eq!(parse_day_path("2024/13/05"), None);
        assert_eq!(parse_day_path("2024/01"), None);
    }

    #[tokio::test]
    async fn test_sticky_assignment_is_persisted() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let mut partitions = PartitionStore::open(store.clone(), PartitionPolicy::Sticky)
            .await
            .unwrap();
        let first = date!(2024 - 12 - 20);
        let second = date!(2024 - 12 - 21);

        assert_eq!(partitions.partition_for(U256::from(1000), first), first);
        assert_eq!(partitions.partition_for(U256::from(1000), second), first);
        partitions.save_map().await.unwrap();

        let mut reopened = PartitionStore::open(store, PartitionPolicy::Sticky).await.unwrap();
        assert_eq!(reopened.partition_for(U256::from(1000), second), first);
        assert_eq!(reopened.partition_for(U256::from(1001), second), second);
    }

    #[tokio::test]
    async fn test_recency_uses_the_run_date() {
        let root = TempDir::new().unwrap();
        let mut partitions = PartitionStore::open(LocalStore::new(root.path()), PartitionPolicy::Recency)
            .await
            .unwrap();

        let first = date!(2024 - 12 - 20);
        let second = date!(2024 - 12 - 21);
        assert_eq!(partitions.partition_for(U256::from(1000), first), first);
        assert_eq!(partitions.partition_for(U256::from(1000), second), second);
        partitions.save_map().await.unwrap();
        assert!(!root.path().join("map.json").exists());
    }

    #[tokio::test]
    async fn test_rebuild_rollups() {
        let root = TempDir::new().unwrap();
        let partitions = PartitionStore::open(LocalStore::new(root.path()), PartitionPolicy::Recency)
            .await
            .unwrap();

        let dec_20 = date!(2024 - 12 - 20);
        let dec_21 = date!(2024 - 12 - 21);

        partitions
            .merge_block(dec_20, U256::from(1000), vec![refund(1000, 0)])
            .await
            .unwrap();
        partitions
            .merge_block(dec_21, U256::from(1000), vec![refund(1000, 0), refund(1000, 1)])
            .await
            .unwrap();
        partitions
            .merge_block(dec_21, U256::from(999), vec![refund(999, 0)])
            .await
            .unwrap();

        let days = BTreeSet::from([dec_20, dec_21]);
        partitions.rebuild_rollups(&days).await.unwrap();

        assert_eq!(partitions.read_day(dec_20).await.unwrap().len(), 1);
        let keys = partitions
            .read_day(dec_21)
            .await
            .unwrap()
            .iter()
            .map(|record| record.key())
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                NaturalKey::header(U256::from(999), U256::ZERO),
                NaturalKey::header(U256::from(1000), U256::ZERO),
                NaturalKey::header(U256::from(1000), U256::from(1)),
            ]
        );

        // The same key in two days collapses to one record.
        let month = partitions.read_month(2024, Month::December).await.unwrap();
        assert_eq!(month.len(), 3);
        assert_eq!(partitions.read_year(2024).await.unwrap(), month);

        assert_eq!(partitions.rebuild_all().await.unwrap(), 2);
        assert_eq!(partitions.read_month(2024, Month::December).await.unwrap(), month);
    }
}
