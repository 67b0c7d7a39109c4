//! weavectl - replay workweave scenarios from the command line.
//!
//! `simulate` runs a scenario through the scheduler cycle and prints the
//! resulting assignments; `score` shows the demand picture of one scan.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
