//! Poll block header attestation events and keep a time-partitioned ledger
//! of their lifecycle.
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod indexer;
pub mod ingestion;
pub mod provider;
pub mod reconcile;
pub mod store;

pub use self::indexer::{index_network, run_networks, IndexerOptions, RunOutcome};
