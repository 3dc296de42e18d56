//! Fold canonical events into lifecycle records.
//!
//! Records are keyed by [NaturalKey]. A commit seen before any other fragment
//! of its block number is kept in a commit-only placeholder until a
//! header-indexed record shows up, at which point it is moved into it.
mod event;
mod merge;
mod record;

pub use self::event::{CanonicalEvent, EventKind};
pub use self::merge::{fold_partitions, merge};
pub use self::record::{
    CommitInfo, EmittedIn, LifecycleRecord, NaturalKey, RefundInfo, RequestInfo, ResponseInfo,
};
