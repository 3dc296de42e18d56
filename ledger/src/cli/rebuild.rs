use clap::Args;
use error_stack::{Result, ResultExt};
use tracing::info;

use crate::{
    error::LedgerError,
    store::{LocalStore, PartitionPolicy, PartitionStore},
};

use super::common::DataArgs;

#[derive(Args, Debug)]
pub struct RebuildArgs {
    #[clap(flatten)]
    data: DataArgs,

    /// Network whose roll-ups are rebuilt.
    #[arg(long = "network")]
    network: String,
}

pub async fn run_rebuild(args: RebuildArgs) -> Result<(), LedgerError> {
    let store = LocalStore::new(&args.data.data_dir).scoped(&args.network);
    if store.list_dirs("").await?.is_empty() {
        return Err(LedgerError::Configuration)
            .attach_printable("network has no partitions")
            .attach_printable_lazy(|| format!("dir: {:?}", store.root()));
    }

    let partitions = PartitionStore::open(store, PartitionPolicy::default()).await?;
    let days = partitions.rebuild_all().await?;

    info!(network = %args.network, days, "rebuilt roll-ups");

    Ok(())
}
