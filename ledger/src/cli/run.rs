use clap::Args;
use error_stack::{Result, ResultExt};
use tracing::info;

use crate::{
    error::LedgerError,
    indexer::{run_networks, IndexerOptions},
    ingestion::MAX_BLOCK_RANGE,
    store::PartitionPolicy,
};

use super::common::{DataArgs, NetworksArgs, RpcArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[clap(flatten)]
    networks: NetworksArgs,
    #[clap(flatten)]
    data: DataArgs,
    #[clap(flatten)]
    rpc: RpcArgs,

    /// Widest block range requested in one `eth_getLogs` call.
    #[arg(
        long = "max-block-range",
        env = "LEDGER_MAX_BLOCK_RANGE",
        default_value_t = MAX_BLOCK_RANGE
    )]
    max_block_range: u64,

    /// How block numbers are assigned to day partitions.
    #[arg(
        long = "partition-policy",
        env = "LEDGER_PARTITION_POLICY",
        value_enum,
        default_value_t = PartitionPolicy::Sticky
    )]
    partition_policy: PartitionPolicy,
}

pub async fn run_indexer(args: RunArgs) -> Result<(), LedgerError> {
    if args.max_block_range == 0 {
        return Err(LedgerError::Configuration)
            .attach_printable("max-block-range must be at least 1");
    }

    let networks = args.networks.load()?;
    let options = IndexerOptions {
        data_dir: args.data.data_dir.clone(),
        max_block_range: args.max_block_range,
        partition_policy: args.partition_policy,
        retry: args.rpc.to_retry_options()?,
    };

    info!(
        networks = networks.len(),
        data_dir = ?options.data_dir,
        partition_policy = %options.partition_policy,
        "starting run"
    );

    run_networks(&networks, args.rpc.to_provider_factory(), &options).await
}
