//! Persisted state of each network: day partitions, roll-ups and progress.
mod local;
mod partition;
mod progress;

pub use self::local::LocalStore;
pub use self::partition::{day_path, parse_day_path, PartitionPolicy, PartitionStore};
pub use self::progress::{
    Progress, ProgressTracker, RangeHistory, RunSummary, ScannedRange, UpdateEntry, UpdateHistory,
};
