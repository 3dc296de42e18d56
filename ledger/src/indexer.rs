//! One poll-and-merge pass over a network.
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use alloy::primitives::U256;
use error_stack::{Result, ResultExt};
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::{error, info, instrument, warn};

use crate::{
    config::NetworkSource,
    core::BlockRange,
    error::LedgerError,
    ingestion::{classify, EndpointRotator, ResilientFetcher, RetryOptions, MAX_BLOCK_RANGE},
    provider::{LogFilter, ProviderFactory},
    reconcile::CanonicalEvent,
    store::{day_path, LocalStore, PartitionPolicy, PartitionStore, ProgressTracker, RunSummary},
};

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Root of the per-network data directories.
    pub data_dir: PathBuf,
    /// Widest block range requested in one `eth_getLogs` call.
    pub max_block_range: u64,
    pub partition_policy: PartitionPolicy,
    pub retry: RetryOptions,
}

impl IndexerOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_block_range: MAX_BLOCK_RANGE,
            partition_policy: PartitionPolicy::default(),
            retry: RetryOptions::default(),
        }
    }

    pub fn network_store(&self, network: &str) -> LocalStore {
        LocalStore::new(&self.data_dir).scoped(network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The cursor is past the chain head, nothing was fetched.
    UpToDate { next_fetch_from: U256 },
    Indexed {
        range: BlockRange,
        events: usize,
        updated_blocks: usize,
        next_fetch_from: U256,
    },
}

/// Fetch, reconcile and persist the new events of one network.
///
/// Nothing is persisted if fetching fails. The cursor is advanced only after
/// partitions and roll-ups are written.
#[instrument(skip_all, fields(network = %source.name))]
pub async fn index_network<F>(
    source: &NetworkSource,
    factory: F,
    options: &IndexerOptions,
    now: OffsetDateTime,
) -> Result<RunOutcome, LedgerError>
where
    F: ProviderFactory,
{
    let store = options.network_store(&source.name);
    let tracker = ProgressTracker::new(store.clone());

    let from_block = tracker.next_fetch_from(source.from_block).await?;

    let rotator = EndpointRotator::new(source.rpcs.clone())
        .attach_printable_lazy(|| format!("network: {}", source.name))?;
    let mut fetcher = ResilientFetcher::new(factory, rotator, options.retry.clone())?;

    let latest_block = fetcher.latest_block_number().await?;
    if from_block > latest_block {
        info!(%from_block, %latest_block, "network is up to date");
        return Ok(RunOutcome::UpToDate {
            next_fetch_from: from_block,
        });
    }

    info!(%from_block, to_block = %latest_block, "fetching logs");
    let filter = LogFilter {
        address: source.address,
    };
    let logs = fetcher
        .fetch_logs(&filter, from_block, latest_block, options.max_block_range)
        .await?;

    let mut events = Vec::with_capacity(logs.len());
    for log in &logs {
        match classify(source.chain_id, log, now) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(err) => warn!(error = ?err, "skipping malformed log"),
        }
    }
    info!(logs = logs.len(), events = events.len(), "classified logs");

    let today = now.to_offset(UtcOffset::UTC).date();
    let mut partitions = PartitionStore::open(store, options.partition_policy).await?;

    // Events of a block number stay in arrival order within their group.
    let mut groups = BTreeMap::<(Date, U256), Vec<CanonicalEvent>>::new();
    for event in events.iter().cloned() {
        let date = partitions.partition_for(event.block_number, today);
        groups
            .entry((date, event.block_number))
            .or_default()
            .push(event);
    }

    // Day assignments are persisted before any block file they point to.
    partitions.save_map().await?;

    let mut touched_days = BTreeSet::new();
    let mut updated_blocks = Vec::with_capacity(groups.len());
    for ((date, block_number), block_events) in groups {
        let records = partitions
            .merge_block(date, block_number, block_events)
            .await?;
        info!(day = %day_path(date), %block_number, records = records.len(), "updated block");
        touched_days.insert(date);
        updated_blocks.push(block_number);
    }

    partitions.rebuild_rollups(&touched_days).await?;

    let range = BlockRange {
        from: from_block,
        to: latest_block,
    };
    let updated = updated_blocks.len();
    let next_fetch_from = tracker
        .record_run(RunSummary {
            finished_at: now,
            date: today,
            range,
            updated_blocks,
        })
        .await?;

    info!(%next_fetch_from, updated_blocks = updated, "network run finished");

    Ok(RunOutcome::Indexed {
        range,
        events: events.len(),
        updated_blocks: updated,
        next_fetch_from,
    })
}

/// Run [index_network] over every network, one after the other.
///
/// A failing network doesn't stop the others. Returns an error naming the
/// failed networks once all of them were attempted.
pub async fn run_networks<F>(
    networks: &[NetworkSource],
    factory: F,
    options: &IndexerOptions,
) -> Result<(), LedgerError>
where
    F: ProviderFactory + Clone,
{
    let mut failed = Vec::new();

    for source in networks {
        let now = OffsetDateTime::now_utc();
        if let Err(err) = index_network(source, factory.clone(), options, now).await {
            error!(network = %source.name, error = ?err, "network run failed");
            failed.push(source.name.clone());
        }
    }

    if failed.is_empty() {
        return Ok(());
    }

    Err(LedgerError::Fatal)
        .attach_printable("some networks failed")
        .attach_printable_lazy(|| format!("networks: {}", failed.join(", ")))
}
