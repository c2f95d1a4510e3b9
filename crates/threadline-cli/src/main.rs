mod bootstrap_helpers;
mod cli_args;
mod startup_modes;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::{init_tracing, load_dotenv};
use crate::cli_args::Cli;
use crate::startup_modes::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    load_dotenv();
    let cli = Cli::parse();
    run_cli(cli).await
}
