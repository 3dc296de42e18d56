//! Getting events out of the chain: endpoint rotation, retries, range
//! splitting and log classification.
mod classifier;
mod fetcher;
mod range;
mod rotator;

pub use self::classifier::classify;
pub use self::fetcher::{ResilientFetcher, RetryOptions};
pub use self::range::{split_ranges, MAX_BLOCK_RANGE};
pub use self::rotator::EndpointRotator;
