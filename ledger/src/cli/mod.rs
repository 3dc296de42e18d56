mod common;
mod rebuild;
mod run;

use clap::{Parser, Subcommand};

use crate::error::Result;

use self::{
    rebuild::{run_rebuild, RebuildArgs},
    run::{run_indexer, RunArgs},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and merge new events of every configured network.
    Run(RunArgs),
    /// Recompute the day, month and year roll-ups of a network.
    Rebuild(RebuildArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.subcommand {
            Command::Run(args) => run_indexer(args).await,
            Command::Rebuild(args) => run_rebuild(args).await,
        }
    }
}
